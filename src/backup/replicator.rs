//! Cloud Replicator
//!
//! Ships sealed archives to the configured remote. Uploads run on a small
//! tokio worker pool bounded by a semaphore; each remote call runs on the
//! blocking pool and is retried up to `UPLOAD_RETRIES` more times with
//! exponential backoff. An upload that exhausts its retries is reported,
//! and the local archive stays put.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{Strictness, UploadSettings};
use crate::error::{HostkeepError, HostkeepResult};
use crate::host::{remote_from_spec, RemoteStore};
use crate::journal::{Journal, Outcome, Scope};
use crate::storage::{read_json, write_json_atomic};

use super::retention::list_archives;

/// A completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub uploaded_at: DateTime<Utc>,
    pub remote: String,
    pub attempts: u32,
}

/// Which archives already reached the remote, keyed by filename
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadLedger {
    #[serde(default)]
    pub uploads: BTreeMap<String, LedgerEntry>,
}

impl UploadLedger {
    pub fn load(path: &Path) -> HostkeepResult<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> HostkeepResult<()> {
        write_json_atomic(path, self)
    }

    pub fn is_uploaded(&self, archive: &str) -> bool {
        self.uploads.contains_key(archive)
    }

    pub fn mark_uploaded(&mut self, archive: &str, remote: &str, attempts: u32) {
        self.uploads.insert(
            archive.to_string(),
            LedgerEntry {
                uploaded_at: Utc::now(),
                remote: remote.to_string(),
                attempts,
            },
        );
    }

    pub fn forget(&mut self, archives: &[String]) {
        for archive in archives {
            self.uploads.remove(archive);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { attempts: u32 },
    AlreadyUploaded,
    /// No remote configured
    Skipped,
    Failed { attempts: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub archive: String,
    pub outcome: UploadOutcome,
}

impl UploadResult {
    pub fn error(&self) -> Option<HostkeepError> {
        match &self.outcome {
            UploadOutcome::Failed { attempts, reason } => Some(HostkeepError::Upload {
                archive: self.archive.clone(),
                attempts: *attempts,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

/// Turn the first failed upload into an error under `fail` strictness
pub fn enforce(results: &[UploadResult], strictness: Strictness) -> HostkeepResult<()> {
    if strictness == Strictness::Warn {
        return Ok(());
    }
    match results.iter().find_map(UploadResult::error) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Uploads archives to one remote
pub struct CloudReplicator<'a> {
    remote: Option<Arc<dyn RemoteStore>>,
    concurrency: usize,
    retries: u32,
    backoff: Duration,
    ledger_path: PathBuf,
    journal: Option<&'a Journal>,
}

impl<'a> CloudReplicator<'a> {
    pub fn new(
        remote: Option<Arc<dyn RemoteStore>>,
        settings: &UploadSettings,
        ledger_path: PathBuf,
    ) -> Self {
        Self {
            remote,
            concurrency: settings.concurrency.max(1),
            retries: settings.retries,
            backoff: Duration::from_secs(2),
            ledger_path,
            journal: None,
        }
    }

    /// Build from settings, resolving the remote spec
    pub fn from_settings(settings: &UploadSettings, ledger_path: PathBuf) -> HostkeepResult<Self> {
        let remote = settings
            .remote
            .as_deref()
            .map(remote_from_spec)
            .transpose()?;
        Ok(Self::new(remote, settings, ledger_path))
    }

    /// Base delay before the first retry; doubled for each further one
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Upload one archive
    pub fn upload(&self, archive: &Path) -> HostkeepResult<UploadResult> {
        let mut results = self.upload_all(vec![archive.to_path_buf()])?;
        results.pop().ok_or_else(|| {
            HostkeepError::Validation(format!("no upload result for {}", archive.display()))
        })
    }

    /// Upload every archive in `backup_dir` that is not in the ledger yet
    pub fn sync(&self, backup_dir: &Path) -> HostkeepResult<Vec<UploadResult>> {
        let ledger = UploadLedger::load(&self.ledger_path)?;
        let pending: Vec<PathBuf> = list_archives(backup_dir)?
            .into_iter()
            .rev()
            .filter(|a| !ledger.is_uploaded(&a.filename))
            .map(|a| a.path)
            .collect();
        debug!(pending = pending.len(), "archives awaiting upload");
        self.upload_all(pending)
    }

    /// Upload `archives` concurrently and record successes in the ledger
    pub fn upload_all(&self, archives: Vec<PathBuf>) -> HostkeepResult<Vec<UploadResult>> {
        let mut ledger = UploadLedger::load(&self.ledger_path)?;

        let Some(remote) = self.remote.clone() else {
            let results: Vec<UploadResult> = archives
                .iter()
                .map(|p| UploadResult {
                    archive: file_name(p),
                    outcome: UploadOutcome::Skipped,
                })
                .collect();
            for r in &results {
                info!(archive = %r.archive, "no remote configured, keeping archive on-premises only");
                self.record(&r.archive, Outcome::Skipped, Some("no remote configured"));
            }
            return Ok(results);
        };

        let (done, todo): (Vec<PathBuf>, Vec<PathBuf>) = archives
            .into_iter()
            .partition(|p| ledger.is_uploaded(&file_name(p)));

        let mut results: Vec<UploadResult> = done
            .iter()
            .map(|p| UploadResult {
                archive: file_name(p),
                outcome: UploadOutcome::AlreadyUploaded,
            })
            .collect();

        if !todo.is_empty() {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(self.concurrency)
                .enable_all()
                .build()
                .map_err(|e| HostkeepError::Io(format!("Failed to start upload workers: {}", e)))?;
            let uploaded = runtime.block_on(upload_concurrently(
                Arc::clone(&remote),
                todo,
                self.concurrency,
                self.retries,
                self.backoff,
            ));
            results.extend(uploaded);
        }

        let target = remote.describe();
        for result in &results {
            match &result.outcome {
                UploadOutcome::Uploaded { attempts } => {
                    ledger.mark_uploaded(&result.archive, &target, *attempts);
                    info!(archive = %result.archive, remote = %target, attempts, "uploaded");
                    self.record(&result.archive, Outcome::Ok, None);
                }
                UploadOutcome::Failed { attempts, reason } => {
                    warn!(archive = %result.archive, attempts, reason = %reason, "upload failed, archive kept locally");
                    self.record(&result.archive, Outcome::Failed, Some(reason));
                }
                UploadOutcome::AlreadyUploaded | UploadOutcome::Skipped => {}
            }
        }
        ledger.save(&self.ledger_path)?;

        Ok(results)
    }

    fn record(&self, archive: &str, outcome: Outcome, message: Option<&str>) {
        if let Some(journal) = self.journal {
            journal.record(Scope::Upload, archive, outcome, message);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn upload_concurrently(
    remote: Arc<dyn RemoteStore>,
    archives: Vec<PathBuf>,
    concurrency: usize,
    retries: u32,
    backoff: Duration,
) -> Vec<UploadResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(archives.len());

    for path in archives {
        let name = file_name(&path);
        let remote = Arc::clone(&remote);
        let semaphore = Arc::clone(&semaphore);
        let task_name = name.clone();
        handles.push((
            name,
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return UploadOutcome::Failed {
                            attempts: 0,
                            reason: format!("worker pool closed: {}", e),
                        }
                    }
                };
                upload_with_retries(remote, path, task_name, retries, backoff).await
            }),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (archive, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => UploadOutcome::Failed {
                attempts: 0,
                reason: format!("upload task failed: {}", join_err),
            },
        };
        results.push(UploadResult { archive, outcome });
    }
    results
}

async fn upload_with_retries(
    remote: Arc<dyn RemoteStore>,
    path: PathBuf,
    name: String,
    retries: u32,
    backoff: Duration,
) -> UploadOutcome {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let (r, p, n) = (Arc::clone(&remote), path.clone(), name.clone());
        let reason = match tokio::task::spawn_blocking(move || r.put(&p, &n)).await {
            Ok(Ok(())) => return UploadOutcome::Uploaded { attempts },
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => join_err.to_string(),
        };

        // the first attempt is not a retry
        if attempts > retries {
            return UploadOutcome::Failed { attempts, reason };
        }

        let delay = backoff.saturating_mul(1 << (attempts - 1).min(16));
        warn!(archive = %name, attempt = attempts, retry_in = ?delay, reason = %reason, "upload attempt failed");
        tokio::time::sleep(delay).await;
    }
}
