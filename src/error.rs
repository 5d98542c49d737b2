//! Custom error types for hostkeep
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Only configuration, integrity and
//! abort-run step failures halt a run; the remaining kinds degrade a result
//! into "completed with warnings".

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for hostkeep operations
#[derive(Error, Debug)]
pub enum HostkeepError {
    /// Required settings that could not be resolved non-interactively
    #[error("Missing configuration: {}", keys.join(", "))]
    MissingConfiguration { keys: Vec<String> },

    /// Malformed configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fetched artifact does not match its declared hash
    #[error("Integrity check failed for '{artifact}': expected {expected}, got {actual}")]
    Integrity {
        artifact: String,
        expected: String,
        actual: String,
    },

    /// An installation step failed
    #[error("Step '{step}' failed: {reason} (see {})", log.display())]
    StepFailure {
        step: String,
        reason: String,
        log: PathBuf,
    },

    /// One backup section could not be captured
    #[error("Section '{section}' capture failed: {reason}")]
    SectionCapture { section: String, reason: String },

    /// Replication exhausted its retries
    #[error("Upload of '{archive}' failed after {attempts} attempt(s): {reason}")]
    Upload {
        archive: String,
        attempts: u32,
        reason: String,
    },

    /// One restore section could not be replayed
    #[error("Restore of section '{section}' failed: {reason}")]
    RestoreSection { section: String, reason: String },

    /// The phase plan is not a valid partial order
    #[error("Plan error: {0}")]
    Plan(String),

    /// External command failures
    #[error("Command '{program}' failed (exit code {code}): {stderr}")]
    Command {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Archive packing/unpacking errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Another run holds the run lock
    #[error("Another run is active (lock held by {holder})")]
    Locked { holder: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML plan parsing errors
    #[error("YAML error: {0}")]
    Yaml(String),
}

impl HostkeepError {
    /// Create a "not found" error for archives
    pub fn archive_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Archive",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for steps
    pub fn step_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Step",
            identifier: identifier.into(),
        }
    }

    /// Whether this error halts the run it occurs in
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SectionCapture { .. } | Self::Upload { .. } | Self::RestoreSection { .. }
        )
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for HostkeepError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HostkeepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for HostkeepError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

/// Result type alias for hostkeep operations
pub type HostkeepResult<T> = Result<T, HostkeepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HostkeepError::Config("bad value".into());
        assert_eq!(err.to_string(), "Configuration error: bad value");
    }

    #[test]
    fn test_missing_configuration_lists_keys() {
        let err = HostkeepError::MissingConfiguration {
            keys: vec!["DOMAIN".into(), "ADMIN_EMAIL".into()],
        };
        assert_eq!(err.to_string(), "Missing configuration: DOMAIN, ADMIN_EMAIL");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_step_failure_names_log() {
        let err = HostkeepError::StepFailure {
            step: "firewall".into(),
            reason: "exit 1".into(),
            log: PathBuf::from("/var/lib/hostkeep/journal.log"),
        };
        let msg = err.to_string();
        assert!(msg.contains("firewall"));
        assert!(msg.contains("journal.log"));
    }

    #[test]
    fn test_degrading_errors_are_not_fatal() {
        let capture = HostkeepError::SectionCapture {
            section: "volume:db".into(),
            reason: "gone".into(),
        };
        let upload = HostkeepError::Upload {
            archive: "a.tar.gz".into(),
            attempts: 3,
            reason: "timeout".into(),
        };
        let restore = HostkeepError::RestoreSection {
            section: "volume:db".into(),
            reason: "no space".into(),
        };
        assert!(!capture.is_fatal());
        assert!(!upload.is_fatal());
        assert!(!restore.is_fatal());

        let integrity = HostkeepError::Integrity {
            artifact: "ssh.sh".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(integrity.is_fatal());
    }

    #[test]
    fn test_not_found_error() {
        let err = HostkeepError::archive_not_found("backup-x.tar.gz");
        assert_eq!(err.to_string(), "Archive not found: backup-x.tar.gz");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HostkeepError = io_err.into();
        assert!(matches!(err, HostkeepError::Io(_)));
    }
}
