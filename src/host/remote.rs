//! Off-site object storage capability
//!
//! Remotes are configured with one string:
//! - `s3://bucket/prefix` uploads with the `aws` CLI
//! - `rclone:<remote>:<path>` uploads with `rclone copyto`

use std::path::Path;
use std::sync::Arc;

use crate::error::{HostkeepError, HostkeepResult};

use super::command::Cmd;

/// A place sealed archives can be copied to
pub trait RemoteStore: Send + Sync {
    /// Human-readable destination, for logs
    fn describe(&self) -> String;

    /// Copy `local` to the remote under `name`
    fn put(&self, local: &Path, name: &str) -> HostkeepResult<()>;
}

/// Parse a remote specification
pub fn remote_from_spec(spec: &str) -> HostkeepResult<Arc<dyn RemoteStore>> {
    let spec = spec.trim();
    if let Some(rest) = spec.strip_prefix("s3://") {
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(HostkeepError::Config(format!("No bucket in remote '{}'", spec)));
        }
        return Ok(Arc::new(S3Remote {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }));
    }
    if let Some(target) = spec.strip_prefix("rclone:") {
        if !target.contains(':') {
            return Err(HostkeepError::Config(format!(
                "rclone remote must look like rclone:<remote>:<path>, got '{}'",
                spec
            )));
        }
        return Ok(Arc::new(RcloneRemote {
            target: target.trim_end_matches('/').to_string(),
        }));
    }
    Err(HostkeepError::Config(format!(
        "Unsupported remote '{}' (expected s3://... or rclone:...)",
        spec
    )))
}

#[derive(Debug, Clone)]
pub struct S3Remote {
    bucket: String,
    prefix: String,
}

impl S3Remote {
    fn url_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}/{}", self.bucket, name)
        } else {
            format!("s3://{}/{}/{}", self.bucket, self.prefix, name)
        }
    }
}

impl RemoteStore for S3Remote {
    fn describe(&self) -> String {
        self.url_for("")
    }

    fn put(&self, local: &Path, name: &str) -> HostkeepResult<()> {
        Cmd::new("aws")
            .args(["s3", "cp", "--only-show-errors"])
            .arg_path(local)
            .arg(self.url_for(name))
            .run()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RcloneRemote {
    target: String,
}

impl RemoteStore for RcloneRemote {
    fn describe(&self) -> String {
        self.target.clone()
    }

    fn put(&self, local: &Path, name: &str) -> HostkeepResult<()> {
        Cmd::new("rclone")
            .arg("copyto")
            .arg_path(local)
            .arg(format!("{}/{}", self.target, name))
            .run()?;
        Ok(())
    }
}
