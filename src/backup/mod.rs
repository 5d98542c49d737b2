//! Backup lifecycle: capture, replicate, restore, prune
//!
//! # Architecture
//!
//! - [`BackupEngine`]: captures sections into a set, seals and compresses it
//! - [`CloudReplicator`]: ships archives to a remote with bounded workers
//! - [`RestoreEngine`]: validates an archive and replays its sections
//! - [`RetentionManager`]: deletes archives past the retention window
//!
//! # Archive Format
//!
//! `<id>.tar.gz`, with entries in this order:
//! - `manifest.json`: id, creation time, hostname, status, sections
//! - `volumes/<name>.tar.gz`: volume snapshots
//! - `configs/<basename>.tar`: configuration trees
//! - `databases/<container>.sql` (or `.archive` for MongoDB): dumps
//! - `userdata/<basename>.tar`: user data trees
//!
//! # Example
//!
//! ```rust,ignore
//! use hostkeep::backup::{BackupEngine, RetentionManager};
//!
//! let report = BackupEngine::new(&runtime, &settings, paths.backup_dir()).run()?;
//! println!("{} ({})", report.archive.display(), report.status().label());
//!
//! RetentionManager::new(paths.backup_dir(), settings.retention_days).prune()?;
//! ```

pub mod archive;
pub mod database;
pub mod engine;
pub mod manifest;
pub mod replicator;
pub mod restore;
pub mod retention;
pub mod section;

pub use database::DatabaseEngine;
pub use engine::{backup_id, BackupEngine, BackupReport, BackupSet, BackupState};
pub use manifest::{BackupManifest, BackupStatus};
pub use replicator::{CloudReplicator, UploadLedger, UploadOutcome, UploadResult};
pub use restore::{RestoreEngine, RestoreOptions, RestoreSummary, ValidationResult};
pub use retention::{find_archive, list_archives, ArchiveInfo, PruneReport, RetentionManager};
pub use section::{CaptureStatus, Section, SectionKind};
