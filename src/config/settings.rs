//! Persisted configuration file
//!
//! Holds the last resolved snapshot so a re-invocation is idempotent
//! without re-prompting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::paths::HostkeepPaths;
use crate::error::HostkeepError;
use crate::storage::{read_json, write_json_atomic};

/// Persisted settings for hostkeep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Resolved key/value pairs from the last run
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// When the values were last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            values: BTreeMap::new(),
            updated_at: None,
        }
    }
}

impl Settings {
    /// Load settings from disk, or defaults if the file doesn't exist
    pub fn load_or_create(paths: &HostkeepPaths) -> Result<Self, HostkeepError> {
        read_json(paths.settings_file()).map_err(|e| {
            HostkeepError::Config(format!("Failed to load settings file: {}", e))
        })
    }

    /// Save settings to disk
    pub fn save(&self, paths: &HostkeepPaths) -> Result<(), HostkeepError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.schema_version, 1);
        assert!(settings.values.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = HostkeepPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings
            .values
            .insert("BACKUP_RETENTION_DAYS".into(), "14".into());
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.get("BACKUP_RETENTION_DAYS"), Some("14"));
    }

    #[test]
    fn test_corrupt_file_is_a_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let paths = HostkeepPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), "{ nope").unwrap();

        let err = Settings::load_or_create(&paths).unwrap_err();
        assert!(matches!(err, HostkeepError::Config(_)));
    }
}
