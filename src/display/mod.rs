//! Display formatting for terminal output
//!
//! Formats run summaries, archive listings and configuration for the CLI.

pub mod backup;
pub mod format;
pub mod install;

pub use backup::{
    format_archive_list, format_backup_report, format_prune_report, format_restore_summary,
    format_upload_results,
};
pub use format::{format_age, format_size};
pub use install::{format_checks, format_config, format_run_report};
