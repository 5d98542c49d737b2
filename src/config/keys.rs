//! Catalogue of known configuration keys and their documented defaults

/// A documented configuration key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub name: &'static str,
    /// Shown when prompting
    pub description: &'static str,
    pub default: Option<&'static str>,
    /// Whether an unset value should be asked for interactively
    pub prompt: bool,
}

pub const BACKUP_RETENTION_DAYS: &str = "BACKUP_RETENTION_DAYS";
pub const BACKUP_REMOTE: &str = "BACKUP_REMOTE";
pub const UPLOAD_CONCURRENCY: &str = "UPLOAD_CONCURRENCY";
pub const UPLOAD_RETRIES: &str = "UPLOAD_RETRIES";
pub const BACKUP_VOLUMES: &str = "BACKUP_VOLUMES";
pub const BACKUP_CONFIG_PATHS: &str = "BACKUP_CONFIG_PATHS";
pub const BACKUP_USER_PATHS: &str = "BACKUP_USER_PATHS";
pub const BACKUP_DATABASES: &str = "BACKUP_DATABASES";
pub const BACKUP_STRICTNESS: &str = "BACKUP_STRICTNESS";
pub const UPLOAD_STRICTNESS: &str = "UPLOAD_STRICTNESS";
pub const VOLUME_HELPER_IMAGE: &str = "VOLUME_HELPER_IMAGE";
pub const CONTAINER_CLI: &str = "CONTAINER_CLI";
pub const PHASE_PLAN: &str = "PHASE_PLAN";

pub const KNOWN_KEYS: &[KeySpec] = &[
    KeySpec {
        name: BACKUP_RETENTION_DAYS,
        description: "Days to keep local backup archives",
        default: Some("7"),
        prompt: false,
    },
    KeySpec {
        name: BACKUP_REMOTE,
        description: "Remote for off-site copies (s3://bucket/prefix or rclone:remote:path)",
        default: None,
        prompt: false,
    },
    KeySpec {
        name: UPLOAD_CONCURRENCY,
        description: "Parallel uploads during cloud sync",
        default: Some("2"),
        prompt: false,
    },
    KeySpec {
        name: UPLOAD_RETRIES,
        description: "Upload retries after the first attempt",
        default: Some("3"),
        prompt: false,
    },
    KeySpec {
        name: BACKUP_VOLUMES,
        description: "Comma-separated volumes to snapshot (empty = all)",
        default: None,
        prompt: false,
    },
    KeySpec {
        name: BACKUP_CONFIG_PATHS,
        description: "Comma-separated configuration paths to snapshot",
        default: Some("/etc/hostkeep"),
        prompt: false,
    },
    KeySpec {
        name: BACKUP_USER_PATHS,
        description: "Comma-separated user data paths to snapshot",
        default: None,
        prompt: false,
    },
    KeySpec {
        name: BACKUP_DATABASES,
        description: "Comma-separated database containers (empty = detect)",
        default: None,
        prompt: false,
    },
    KeySpec {
        name: BACKUP_STRICTNESS,
        description: "warn or fail when a section capture fails",
        default: Some("warn"),
        prompt: false,
    },
    KeySpec {
        name: UPLOAD_STRICTNESS,
        description: "warn or fail when an upload exhausts retries",
        default: Some("warn"),
        prompt: false,
    },
    KeySpec {
        name: VOLUME_HELPER_IMAGE,
        description: "Image used to read and write volume contents",
        default: Some("alpine:3.20"),
        prompt: false,
    },
    KeySpec {
        name: CONTAINER_CLI,
        description: "Docker-compatible CLI used for volumes and containers",
        default: Some("docker"),
        prompt: false,
    },
    KeySpec {
        name: PHASE_PLAN,
        description: "Path or URL of the installation phase plan",
        default: None,
        prompt: true,
    },
];

/// Look up a documented key
pub fn spec_for(name: &str) -> Option<&'static KeySpec> {
    KNOWN_KEYS.iter().find(|k| k.name == name)
}
