//! Where step artifacts come from
//!
//! Locations are either local paths (optionally `file://`) or `http(s)://`
//! URLs fetched with `curl`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HostkeepError, HostkeepResult};
use crate::host::Cmd;

/// Retrieves an artifact to a local file
pub trait ArtifactSource {
    fn fetch(&self, location: &str, dest: &Path) -> HostkeepResult<()>;
}

/// Copies local files
#[derive(Debug, Clone, Default)]
pub struct LocalSource;

impl ArtifactSource for LocalSource {
    fn fetch(&self, location: &str, dest: &Path) -> HostkeepResult<()> {
        let path = local_path(location);
        fs::copy(&path, dest).map_err(|e| {
            HostkeepError::Io(format!("Failed to copy {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

/// Downloads with `curl`, retrying transient failures
#[derive(Debug, Clone)]
pub struct HttpSource {
    retries: u32,
}

impl HttpSource {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ArtifactSource for HttpSource {
    fn fetch(&self, location: &str, dest: &Path) -> HostkeepResult<()> {
        debug!(url = location, "downloading artifact");
        Cmd::new("curl")
            .args(["--fail", "--silent", "--show-error", "--location"])
            .arg("--retry")
            .arg(self.retries.to_string())
            .arg("--output")
            .arg_path(dest)
            .arg(location)
            .run()?;
        Ok(())
    }
}

/// Dispatches on the location scheme
#[derive(Debug, Clone, Default)]
pub struct AnySource {
    local: LocalSource,
    http: HttpSource,
}

impl ArtifactSource for AnySource {
    fn fetch(&self, location: &str, dest: &Path) -> HostkeepResult<()> {
        if is_remote(location) {
            self.http.fetch(location, dest)
        } else {
            self.local.fetch(location, dest)
        }
    }
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn local_path(location: &str) -> PathBuf {
    PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
}

/// Resolve `location` relative to the plan it was declared in
pub fn resolve_location(base: &str, location: &str) -> String {
    if is_remote(location) || location.starts_with("file://") || Path::new(location).is_absolute()
    {
        return location.to_string();
    }
    if is_remote(base) {
        let dir = base.rsplit_once('/').map(|(d, _)| d).unwrap_or(base);
        return format!("{}/{}", dir, location);
    }
    local_path(base)
        .parent()
        .map(|dir| dir.join(location).to_string_lossy().into_owned())
        .unwrap_or_else(|| location.to_string())
}
