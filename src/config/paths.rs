//! Path management for hostkeep
//!
//! Resolves where configuration, state, the journal and local archives live.
//!
//! ## Path Resolution Order
//!
//! 1. `HOSTKEEP_HOME` environment variable (if set)
//! 2. The platform config directory joined with `hostkeep`
//!    (`$XDG_CONFIG_HOME/hostkeep` or `~/.config/hostkeep` on Linux)
//!
//! The backup directory can be moved independently with `HOSTKEEP_BACKUP_DIR`.

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::HostkeepError;

/// Manages all paths used by hostkeep
#[derive(Debug, Clone)]
pub struct HostkeepPaths {
    /// Base directory for configuration and state
    base_dir: PathBuf,
    /// Directory holding sealed archives
    backup_dir: PathBuf,
}

impl HostkeepPaths {
    /// Create a new HostkeepPaths instance from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, HostkeepError> {
        let base_dir = if let Ok(custom) = std::env::var("HOSTKEEP_HOME") {
            PathBuf::from(custom)
        } else {
            let dirs = BaseDirs::new().ok_or_else(|| {
                HostkeepError::Config("Could not determine home directory".into())
            })?;
            dirs.config_dir().join("hostkeep")
        };

        let backup_dir = std::env::var("HOSTKEEP_BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join("backups"));

        Ok(Self {
            base_dir,
            backup_dir,
        })
    }

    /// Create HostkeepPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let backup_dir = base_dir.join("backups");
        Self {
            base_dir,
            backup_dir,
        }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the backup directory (sealed archives)
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir.clone()
    }

    /// Get the state directory (scratch and staging areas)
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    /// Get the directory verified step artifacts are staged into
    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    /// Get the parent directory for restore scratch areas
    pub fn scratch_dir(&self) -> PathBuf {
        self.state_dir().join("scratch")
    }

    /// Get the path to the persisted configuration file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the upload ledger
    pub fn upload_ledger(&self) -> PathBuf {
        self.base_dir.join("uploads.json")
    }

    /// Get the path to the run journal
    pub fn journal_file(&self) -> PathBuf {
        self.base_dir.join("journal.log")
    }

    /// Get the path to the run lock marker
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("hostkeep.lock")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), HostkeepError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| HostkeepError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| HostkeepError::Io(format!("Failed to create backup directory: {}", e)))?;

        std::fs::create_dir_all(self.scratch_dir())
            .map_err(|e| HostkeepError::Io(format!("Failed to create state directory: {}", e)))?;

        Ok(())
    }
}
