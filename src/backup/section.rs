//! Sections: one captured category of host state

use std::fmt;

use serde::{Deserialize, Serialize};

use super::database::DatabaseEngine;

/// Category of captured host state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    VolumeSnapshot,
    ConfigSnapshot,
    DatabaseDump,
    UserData,
}

impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::VolumeSnapshot,
        SectionKind::ConfigSnapshot,
        SectionKind::DatabaseDump,
        SectionKind::UserData,
    ];

    /// Directory inside a backup set holding this kind's artifacts
    pub fn dir_name(&self) -> &'static str {
        match self {
            SectionKind::VolumeSnapshot => "volumes",
            SectionKind::ConfigSnapshot => "configs",
            SectionKind::DatabaseDump => "databases",
            SectionKind::UserData => "userdata",
        }
    }

    /// Prefix used in section ids
    pub fn prefix(&self) -> &'static str {
        match self {
            SectionKind::VolumeSnapshot => "volume",
            SectionKind::ConfigSnapshot => "config",
            SectionKind::DatabaseDump => "database",
            SectionKind::UserData => "userdata",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// How a section's capture went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    Ok,
    /// Skipped for a benign reason (e.g. unknown database engine)
    Warn,
    Failed,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Ok => write!(f, "ok"),
            CaptureStatus::Warn => write!(f, "warn"),
            CaptureStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One section of a backup set, as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    /// Volume name, container name or host path
    pub source: String,
    pub status: CaptureStatus,
    /// Artifact path relative to the set root, present when status is ok
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<DatabaseEngine>,
}

impl Section {
    pub fn ok(kind: SectionKind, source: impl Into<String>, artifact: String, size_bytes: u64) -> Self {
        Self {
            kind,
            source: source.into(),
            status: CaptureStatus::Ok,
            artifact: Some(artifact),
            size_bytes,
            message: None,
            engine: None,
        }
    }

    pub fn warn(kind: SectionKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::not_captured(kind, source, CaptureStatus::Warn, message)
    }

    pub fn failed(kind: SectionKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::not_captured(kind, source, CaptureStatus::Failed, message)
    }

    fn not_captured(
        kind: SectionKind,
        source: impl Into<String>,
        status: CaptureStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            status,
            artifact: None,
            size_bytes: 0,
            message: Some(message.into()),
            engine: None,
        }
    }

    pub fn with_engine(mut self, engine: DatabaseEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Stable id, e.g. `volume:pgdata`
    pub fn id(&self) -> String {
        format!("{}:{}", self.kind.prefix(), self.source)
    }

    pub fn is_ok(&self) -> bool {
        self.status == CaptureStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_id() {
        let s = Section::failed(SectionKind::VolumeSnapshot, "media", "detached");
        assert_eq!(s.id(), "volume:media");
        assert!(!s.is_ok());
        assert!(s.artifact.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let s = Section::ok(
            SectionKind::DatabaseDump,
            "db",
            "databases/db.sql".into(),
            42,
        )
        .with_engine(DatabaseEngine::Postgres);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["kind"], "database-dump");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["engine"], "postgres");
        assert!(json.get("message").is_none());
    }
}
