//! Retention Manager
//!
//! Deletes archives older than the retention window, but never the most
//! recent successful archive, whatever its age.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{HostkeepError, HostkeepResult};
use crate::journal::{Journal, Outcome, Scope};

use super::archive::{read_manifest, ARCHIVE_SUFFIX, PARTIAL_SUFFIX};
use super::manifest::BackupStatus;
use super::replicator::UploadLedger;

/// Metadata about an archive on disk
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    /// Archive filename
    pub filename: String,
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// `None` when the manifest could not be read
    pub status: Option<BackupStatus>,
}

impl ArchiveInfo {
    pub fn is_successful(&self) -> bool {
        self.status.map(|s| s.is_successful()).unwrap_or(false)
    }
}

/// List archives in `backup_dir`, newest first
pub fn list_archives(backup_dir: &Path) -> HostkeepResult<Vec<ArchiveInfo>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let mut archives = Vec::new();

    for entry in fs::read_dir(backup_dir)
        .map_err(|e| HostkeepError::Io(format!("Failed to read backup directory: {}", e)))?
    {
        let entry = entry
            .map_err(|e| HostkeepError::Io(format!("Failed to read directory entry: {}", e)))?;
        if let Some(info) = parse_archive_info(&entry.path()) {
            archives.push(info);
        }
    }

    archives.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(archives)
}

/// Find an archive by filename, id or path
pub fn find_archive(backup_dir: &Path, name: &str) -> HostkeepResult<PathBuf> {
    let direct = Path::new(name);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    list_archives(backup_dir)?
        .into_iter()
        .find(|a| a.filename == name || a.id == name)
        .map(|a| a.path)
        .ok_or_else(|| HostkeepError::archive_not_found(name))
}

fn parse_archive_info(path: &Path) -> Option<ArchiveInfo> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    let id = filename.strip_suffix(ARCHIVE_SUFFIX)?.to_string();
    let created_at = parse_backup_timestamp(id.strip_prefix("backup-")?)?;
    let size_bytes = fs::metadata(path).ok()?.len();

    let status = match read_manifest(path) {
        Ok(manifest) => Some(manifest.status),
        Err(e) => {
            warn!(archive = %filename, error = %e, "unreadable manifest");
            None
        }
    };

    Some(ArchiveInfo {
        filename,
        id,
        path: path.to_path_buf(),
        created_at,
        size_bytes,
        status,
    })
}

/// Parse the timestamp part of a backup id
///
/// Accepts `YYYYMMDD-HHMMSS` and `YYYYMMDD-HHMMSS-mmm`.
pub fn parse_backup_timestamp(date_str: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = date_str.split('-').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let (date_part, time_part) = (parts[0], parts[1]);
    let millis: u32 = match parts.get(2) {
        Some(ms) => ms.parse().ok()?,
        None => 0,
    };

    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(date_part, 8) || !digits(time_part, 6) {
        return None;
    }

    let year: i32 = date_part[0..4].parse().ok()?;
    let month: u32 = date_part[4..6].parse().ok()?;
    let day: u32 = date_part[6..8].parse().ok()?;
    let hour: u32 = time_part[0..2].parse().ok()?;
    let minute: u32 = time_part[2..4].parse().ok()?;
    let second: u32 = time_part[4..6].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;

    Some(DateTime::from_naive_utc_and_offset(
        chrono::NaiveDateTime::new(date, time),
        Utc,
    ))
}

/// What a retention pass did
#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    /// The archive protected regardless of age
    pub protected: Option<PathBuf>,
    pub kept: usize,
}

/// Enforces the retention window
pub struct RetentionManager<'a> {
    backup_dir: PathBuf,
    retention_days: u32,
    ledger: Option<PathBuf>,
    journal: Option<&'a Journal>,
}

impl<'a> RetentionManager<'a> {
    pub fn new(backup_dir: PathBuf, retention_days: u32) -> Self {
        Self {
            backup_dir,
            retention_days,
            ledger: None,
            journal: None,
        }
    }

    /// Also drop ledger entries of deleted archives
    pub fn with_ledger(mut self, ledger: PathBuf) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Prune relative to the current time
    pub fn prune(&self) -> HostkeepResult<PruneReport> {
        self.prune_at(Utc::now())
    }

    /// Prune every archive created before `now - retention_days`, except
    /// the newest successful one
    pub fn prune_at(&self, now: DateTime<Utc>) -> HostkeepResult<PruneReport> {
        let cutoff = now
            .checked_sub_signed(Duration::days(i64::from(self.retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let archives = list_archives(&self.backup_dir)?;
        let protected = archives.iter().find(|a| a.is_successful()).map(|a| a.path.clone());

        let mut report = PruneReport {
            protected: protected.clone(),
            ..PruneReport::default()
        };

        for archive in archives {
            let expired = archive.created_at < cutoff;
            if !expired || protected.as_ref() == Some(&archive.path) {
                report.kept += 1;
                continue;
            }
            fs::remove_file(&archive.path).map_err(|e| {
                HostkeepError::Io(format!("Failed to delete old backup: {}", e))
            })?;
            info!(archive = %archive.filename, "pruned");
            if let Some(journal) = self.journal {
                journal.record(Scope::Retention, &archive.filename, Outcome::Ok, Some("deleted"));
            }
            report.deleted.push(archive.path);
        }

        self.remove_stale_partials(cutoff);

        if let Some(ledger_path) = &self.ledger {
            let names: Vec<String> = report
                .deleted
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            if !names.is_empty() {
                let mut ledger = UploadLedger::load(ledger_path)?;
                ledger.forget(&names);
                ledger.save(ledger_path)?;
            }
        }

        Ok(report)
    }

    /// Leftovers of interrupted runs
    fn remove_stale_partials(&self, cutoff: DateTime<Utc>) {
        let Ok(entries) = fs::read_dir(&self.backup_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(PARTIAL_SUFFIX))
                .and_then(|n| n.strip_suffix(ARCHIVE_SUFFIX))
                .and_then(|id| id.strip_prefix("backup-"))
                .and_then(parse_backup_timestamp)
                .map(|at| at < cutoff)
                .unwrap_or(false);
            if stale {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove partial archive");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::pack_set;
    use crate::backup::manifest::{BackupManifest, MANIFEST_FILE};
    use crate::backup::section::{Section, SectionKind};
    use chrono::Datelike;
    use tempfile::TempDir;

    /// Write a real archive with the given age; a failed one captured nothing
    fn make_archive(dir: &Path, at: DateTime<Utc>, ok: bool) -> PathBuf {
        let id = crate::backup::engine::backup_id(at);
        let set = dir.join(&id);
        fs::create_dir_all(set.join("volumes")).unwrap();
        let sections = if ok {
            fs::write(set.join("volumes/v.tar.gz"), b"x").unwrap();
            vec![Section::ok(SectionKind::VolumeSnapshot, "v", "volumes/v.tar.gz".into(), 1)]
        } else {
            Vec::new()
        };
        let manifest = BackupManifest::new(id.clone(), at, sections);
        fs::write(set.join(MANIFEST_FILE), serde_json::to_vec(&manifest).unwrap()).unwrap();
        let dest = dir.join(format!("{id}.tar.gz"));
        pack_set(&set, &dest).unwrap();
        fs::remove_dir_all(&set).unwrap();
        dest
    }

    #[test]
    fn test_parse_backup_timestamp() {
        let timestamp = parse_backup_timestamp("20251127-143022").unwrap();
        assert_eq!(timestamp.year(), 2025);
        assert_eq!(timestamp.month(), 11);
        assert_eq!(timestamp.day(), 27);

        assert!(parse_backup_timestamp("20251127-143022-456").is_some());
        assert!(parse_backup_timestamp("20251127").is_none());
        assert!(parse_backup_timestamp("20251327-143022").is_none());
        assert!(parse_backup_timestamp("202\u{e9}112-143022").is_none());
        assert!(parse_backup_timestamp("20251127-14302\u{e9}").is_none());
        assert!(parse_backup_timestamp("+2025112-143022").is_none());
    }

    #[test]
    fn test_non_ascii_archive_name_is_ignored() {
        let temp = TempDir::new().unwrap();
        make_archive(temp.path(), Utc::now(), true);
        fs::write(temp.path().join("backup-202\u{e9}112-143022.tar.gz"), b"x").unwrap();

        let archives = list_archives(temp.path()).unwrap();
        assert_eq!(archives.len(), 1);
    }

    #[test]
    fn test_huge_retention_window_keeps_everything() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        make_archive(temp.path(), now - Duration::days(400), true);
        make_archive(temp.path(), now - Duration::days(1), true);

        let report = RetentionManager::new(temp.path().to_path_buf(), 100_000_000)
            .prune_at(now)
            .unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn test_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        make_archive(temp.path(), now - Duration::days(2), true);
        make_archive(temp.path(), now - Duration::days(1), false);
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let archives = list_archives(temp.path()).unwrap();
        assert_eq!(archives.len(), 2);
        assert!(archives[0].created_at > archives[1].created_at);
        assert_eq!(archives[0].status, Some(BackupStatus::Failed));
        assert!(archives[1].is_successful());
    }

    #[test]
    fn test_zero_threshold_keeps_newest_successful() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        make_archive(temp.path(), now - Duration::days(3), true);
        let newest_ok = make_archive(temp.path(), now - Duration::days(2), true);
        make_archive(temp.path(), now - Duration::days(1), false);

        let report = RetentionManager::new(temp.path().to_path_buf(), 0)
            .prune_at(now)
            .unwrap();

        assert_eq!(report.deleted.len(), 2);
        let remaining = list_archives(temp.path()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, newest_ok);
    }

    #[test]
    fn test_window_keeps_recent() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        let old = make_archive(temp.path(), now - Duration::days(10), true);
        make_archive(temp.path(), now - Duration::days(3), true);
        make_archive(temp.path(), now - Duration::hours(1), true);

        let report = RetentionManager::new(temp.path().to_path_buf(), 7)
            .prune_at(now)
            .unwrap();

        assert_eq!(report.deleted, vec![old]);
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn test_prunes_ledger_and_partials() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        let old = make_archive(temp.path(), now - Duration::days(30), true);
        make_archive(temp.path(), now - Duration::days(1), true);
        let partial_id = crate::backup::engine::backup_id(now - Duration::days(30));
        let partial = temp.path().join(format!("{partial_id}.tar.gz.partial"));
        fs::write(&partial, "half").unwrap();

        let ledger_path = temp.path().join("uploads.json");
        let mut ledger = UploadLedger::default();
        let old_name = old.file_name().unwrap().to_string_lossy().into_owned();
        ledger.mark_uploaded(&old_name, "s3://bucket", 1);
        ledger.save(&ledger_path).unwrap();

        RetentionManager::new(temp.path().to_path_buf(), 7)
            .with_ledger(ledger_path.clone())
            .prune_at(now)
            .unwrap();

        assert!(!old.exists());
        assert!(!partial.exists());
        assert!(!UploadLedger::load(&ledger_path).unwrap().is_uploaded(&old_name));
    }

    #[test]
    fn test_empty_backup_dir() {
        let temp = TempDir::new().unwrap();
        let report = RetentionManager::new(temp.path().join("missing"), 0)
            .prune()
            .unwrap();
        assert!(report.deleted.is_empty());
        assert!(report.protected.is_none());
    }
}
