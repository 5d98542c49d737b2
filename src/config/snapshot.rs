//! Immutable configuration snapshot and typed views over it
//!
//! A [`ConfigSnapshot`] is resolved once per invocation and then passed by
//! reference into every step and section call. It exposes no mutators.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::keys;
use crate::error::{HostkeepError, HostkeepResult};

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Env,
    File,
    Prompt,
    Default,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueSource::Env => "env",
            ValueSource::File => "file",
            ValueSource::Prompt => "prompt",
            ValueSource::Default => "default",
        };
        write!(f, "{}", s)
    }
}

/// Resolved key/value configuration for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, String>,
    sources: BTreeMap<String, ValueSource>,
}

impl ConfigSnapshot {
    pub(crate) fn from_parts(
        values: BTreeMap<String, String>,
        sources: BTreeMap<String, ValueSource>,
    ) -> Self {
        Self { values, sources }
    }

    /// Build a snapshot directly from pairs (tests, embedding)
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let sources = values
            .keys()
            .map(|k| (k.clone(), ValueSource::File))
            .collect();
        Self { values, sources }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn source(&self, key: &str) -> Option<ValueSource> {
        self.sources.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Truthy values: `1`, `true`, `yes`, `on`
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).map(is_truthy).unwrap_or(false)
    }

    /// Parse an unsigned integer value, falling back to `default` when unset
    pub fn get_u32(&self, key: &str, default: u32) -> HostkeepResult<u32> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                HostkeepError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
            }),
        }
    }

    /// Comma-separated list, empty entries dropped
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

pub(crate) fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Whether a degraded result should fail the invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Degraded results are reported as warnings (historical behavior)
    #[default]
    Warn,
    /// Degraded results make the invocation exit non-zero
    Fail,
}

impl Strictness {
    fn parse(key: &str, raw: Option<&str>) -> HostkeepResult<Self> {
        match raw.map(|s| s.trim().to_lowercase()) {
            None => Ok(Strictness::Warn),
            Some(s) if s == "warn" => Ok(Strictness::Warn),
            Some(s) if s == "fail" => Ok(Strictness::Fail),
            Some(other) => Err(HostkeepError::Config(format!(
                "{} must be 'warn' or 'fail', got '{}'",
                key, other
            ))),
        }
    }
}

/// Backup-related settings derived from a snapshot
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub retention_days: u32,
    /// Volumes to snapshot; empty means every volume the runtime knows
    pub volumes: Vec<String>,
    pub config_paths: Vec<String>,
    pub user_paths: Vec<String>,
    /// Database containers; empty means auto-detect
    pub databases: Vec<String>,
    pub strictness: Strictness,
    pub helper_image: String,
    /// `docker` or a compatible binary such as `podman`
    pub container_cli: String,
}

impl BackupSettings {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> HostkeepResult<Self> {
        Ok(Self {
            retention_days: snapshot.get_u32(keys::BACKUP_RETENTION_DAYS, 7)?,
            volumes: snapshot.get_list(keys::BACKUP_VOLUMES),
            config_paths: snapshot.get_list(keys::BACKUP_CONFIG_PATHS),
            user_paths: snapshot.get_list(keys::BACKUP_USER_PATHS),
            databases: snapshot.get_list(keys::BACKUP_DATABASES),
            strictness: Strictness::parse(
                keys::BACKUP_STRICTNESS,
                snapshot.get(keys::BACKUP_STRICTNESS),
            )?,
            helper_image: snapshot
                .get(keys::VOLUME_HELPER_IMAGE)
                .unwrap_or("alpine:3.20")
                .to_string(),
            container_cli: snapshot
                .get(keys::CONTAINER_CLI)
                .unwrap_or("docker")
                .to_string(),
        })
    }
}

/// Replication settings derived from a snapshot
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// `None` means on-premises only
    pub remote: Option<String>,
    pub concurrency: usize,
    /// Retries after the first attempt
    pub retries: u32,
    pub strictness: Strictness,
}

impl UploadSettings {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> HostkeepResult<Self> {
        let concurrency = snapshot.get_u32(keys::UPLOAD_CONCURRENCY, 2)?.max(1) as usize;
        Ok(Self {
            remote: snapshot
                .get(keys::BACKUP_REMOTE)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            concurrency,
            retries: snapshot.get_u32(keys::UPLOAD_RETRIES, 3)?,
            strictness: Strictness::parse(
                keys::UPLOAD_STRICTNESS,
                snapshot.get(keys::UPLOAD_STRICTNESS),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_parsing() {
        let snapshot = ConfigSnapshot::from_pairs([("BACKUP_VOLUMES", " db , , media,")]);
        assert_eq!(snapshot.get_list("BACKUP_VOLUMES"), vec!["db", "media"]);
        assert!(snapshot.get_list("MISSING").is_empty());
    }

    #[test]
    fn test_bool_parsing() {
        let snapshot = ConfigSnapshot::from_pairs([("A", "Yes"), ("B", "0")]);
        assert!(snapshot.get_bool("A"));
        assert!(!snapshot.get_bool("B"));
        assert!(!snapshot.get_bool("C"));
    }

    #[test]
    fn test_backup_settings_defaults() {
        let settings = BackupSettings::from_snapshot(&ConfigSnapshot::default()).unwrap();
        assert_eq!(settings.retention_days, 7);
        assert_eq!(settings.strictness, Strictness::Warn);
        assert_eq!(settings.helper_image, "alpine:3.20");
        assert_eq!(settings.container_cli, "docker");
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let snapshot = ConfigSnapshot::from_pairs([("BACKUP_RETENTION_DAYS", "a week")]);
        let err = BackupSettings::from_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, HostkeepError::Config(_)));
    }

    #[test]
    fn test_upload_settings() {
        let snapshot = ConfigSnapshot::from_pairs([
            ("BACKUP_REMOTE", "  "),
            ("UPLOAD_CONCURRENCY", "0"),
            ("UPLOAD_STRICTNESS", "FAIL"),
        ]);
        let settings = UploadSettings::from_snapshot(&snapshot).unwrap();
        assert!(settings.remote.is_none());
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.retries, 3);
        assert_eq!(settings.strictness, Strictness::Fail);
    }
}
