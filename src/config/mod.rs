//! Configuration module for hostkeep
//!
//! This module provides configuration management including:
//! - Path resolution for state, journal and archives
//! - The persisted configuration file
//! - Resolution of one immutable [`ConfigSnapshot`] per invocation

pub mod keys;
pub mod paths;
pub mod resolver;
pub mod settings;
pub mod snapshot;

pub use paths::HostkeepPaths;
pub use resolver::ConfigResolver;
pub use settings::Settings;
pub use snapshot::{BackupSettings, ConfigSnapshot, Strictness, UploadSettings, ValueSource};
