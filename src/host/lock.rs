//! Run-level mutual exclusion
//!
//! A marker file created with `create_new` guards against two simultaneous
//! invocations on one host. The marker records the holder's pid; a marker
//! whose pid is no longer alive (for example after an operator interrupt)
//! is taken over.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::error::{HostkeepError, HostkeepResult};

/// Held for the duration of a run; released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock at `path`
    pub fn acquire(path: &Path) -> HostkeepResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(path).unwrap_or_default();
                let pid = parse_pid(&holder);
                if pid.map(process_alive).unwrap_or(false) {
                    return Err(HostkeepError::Locked {
                        holder: holder.trim().to_string(),
                    });
                }
                warn!(lock = %path.display(), holder = %holder.trim(), "taking over stale run lock");
                fs::remove_file(path)?;
                Self::try_create(path).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => HostkeepError::Locked {
                        holder: "a concurrent invocation".into(),
                    },
                    _ => HostkeepError::from(e),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "pid={} started={}", std::process::id(), Utc::now().to_rfc3339())?;
        file.sync_all()?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn parse_pid(holder: &str) -> Option<u32> {
    holder
        .split_whitespace()
        .find_map(|part| part.strip_prefix("pid="))
        .and_then(|pid| pid.parse().ok())
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // Without a cheap liveness probe, treat any marker as held.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hostkeep.lock");

        let _held = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, HostkeepError::Locked { .. }));
    }

    #[test]
    fn test_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hostkeep.lock");

        {
            let lock = RunLock::acquire(&path).unwrap();
            assert!(lock.path().exists());
        }
        assert!(!path.exists());
        let _again = RunLock::acquire(&path).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_lock_is_taken_over() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hostkeep.lock");
        fs::write(&path, "pid=4294967294 started=2020-01-01T00:00:00Z\n").unwrap();

        let lock = RunLock::acquire(&path).unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        assert!(contents.contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("pid=42 started=x"), Some(42));
        assert_eq!(parse_pid("garbage"), None);
    }
}
