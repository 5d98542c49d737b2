//! Backup manifest
//!
//! `manifest.json` is the first entry of every archive and the only thing
//! retention and listing need to read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::section::{CaptureStatus, Section};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Overall status of a backup set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupStatus {
    Complete,
    CompletedWithWarnings,
    Failed,
}

impl BackupStatus {
    /// `complete` iff every section is ok; any warn or failed section
    /// downgrades to warnings. Only a set with nothing attempted is `failed`.
    pub fn from_sections(sections: &[Section]) -> Self {
        if sections.is_empty() {
            BackupStatus::Failed
        } else if sections.iter().all(|s| s.status == CaptureStatus::Ok) {
            BackupStatus::Complete
        } else {
            BackupStatus::CompletedWithWarnings
        }
    }

    /// Whether the archive counts as a successful backup for retention
    pub fn is_successful(&self) -> bool {
        *self != BackupStatus::Failed
    }

    pub fn label(&self) -> &'static str {
        match self {
            BackupStatus::Complete => "complete",
            BackupStatus::CompletedWithWarnings => "completed with warnings",
            BackupStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub schema_version: u32,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub hostname: String,
    pub status: BackupStatus,
    pub sections: Vec<Section>,
}

impl BackupManifest {
    pub fn new(id: String, created_at: DateTime<Utc>, sections: Vec<Section>) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            id,
            created_at,
            hostname: hostname(),
            status: BackupStatus::from_sections(&sections),
            sections,
        }
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id() == id)
    }

    /// Sum of artifact sizes
    pub fn total_bytes(&self) -> u64 {
        self.sections.iter().map(|s| s.size_bytes).sum()
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::section::SectionKind;

    fn ok(name: &str) -> Section {
        Section::ok(SectionKind::VolumeSnapshot, name, format!("volumes/{name}.tar.gz"), 1)
    }

    #[test]
    fn test_status_from_sections() {
        let failed = Section::failed(SectionKind::VolumeSnapshot, "b", "gone");
        let warned = Section::warn(SectionKind::DatabaseDump, "cache", "unknown engine");

        assert_eq!(BackupStatus::from_sections(&[ok("a")]), BackupStatus::Complete);
        assert_eq!(
            BackupStatus::from_sections(&[ok("a"), failed.clone()]),
            BackupStatus::CompletedWithWarnings
        );
        assert_eq!(
            BackupStatus::from_sections(&[ok("a"), warned.clone()]),
            BackupStatus::CompletedWithWarnings
        );
        assert_eq!(
            BackupStatus::from_sections(&[failed.clone(), warned.clone()]),
            BackupStatus::CompletedWithWarnings
        );
        assert_eq!(BackupStatus::from_sections(&[]), BackupStatus::Failed);
    }

    #[test]
    fn test_single_unsuccessful_section_is_not_failed() {
        let failed = Section::failed(SectionKind::VolumeSnapshot, "only", "gone");
        let warned = Section::warn(SectionKind::DatabaseDump, "cache", "unknown engine");

        let status = BackupStatus::from_sections(&[failed]);
        assert_eq!(status, BackupStatus::CompletedWithWarnings);
        assert!(status.is_successful());
        assert_eq!(
            BackupStatus::from_sections(&[warned]),
            BackupStatus::CompletedWithWarnings
        );
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&BackupStatus::CompletedWithWarnings).unwrap();
        assert_eq!(json, "\"completed-with-warnings\"");
    }

    #[test]
    fn test_manifest_lookup() {
        let manifest = BackupManifest::new("backup-x".into(), Utc::now(), vec![ok("a"), ok("b")]);
        assert_eq!(manifest.status, BackupStatus::Complete);
        assert!(manifest.section("volume:b").is_some());
        assert_eq!(manifest.total_bytes(), 2);
        assert!(!manifest.hostname.is_empty());
    }
}
