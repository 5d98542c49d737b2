//! Restore Engine
//!
//! Extracts one archive into a scratch directory, validates it, then
//! replays each captured section by kind. A failing section is reported and
//! the remaining sections still run. Containers that depend on restored
//! state are restarted afterwards on a best-effort basis.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};

use crate::error::{HostkeepError, HostkeepResult};
use crate::host::{ContainerRuntime, Prompter};
use crate::journal::{Journal, Outcome, Scope};

use super::archive::{unpack, unpack_path};
use super::manifest::{BackupManifest, MANIFEST_FILE};
use super::section::{Section, SectionKind};

/// An archive extracted into scratch space; removed on drop
pub struct OpenedArchive {
    scratch: TempDir,
    pub manifest: BackupManifest,
}

impl OpenedArchive {
    pub fn root(&self) -> &Path {
        self.scratch.path()
    }
}

/// Result of validating an archive
#[derive(Debug)]
pub struct ValidationResult {
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Section ids that will be replayed
    pub restorable: Vec<String>,
    /// Section ids that were not captured and will be skipped
    pub not_captured: Vec<String>,
}

impl ValidationResult {
    pub fn summary(&self) -> String {
        if self.not_captured.is_empty() {
            format!("Complete backup: {} section(s)", self.restorable.len())
        } else {
            format!(
                "Partial backup: {} restorable, {} not captured ({})",
                self.restorable.len(),
                self.not_captured.len(),
                self.not_captured.join(", ")
            )
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Validate only
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub assume_yes: bool,
}

/// What a restore did, by section id
#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub archive: String,
    pub dry_run: bool,
    pub cancelled: bool,
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub restarted: Vec<String>,
    pub validation: Option<ValidationResult>,
}

impl RestoreSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures as typed errors
    pub fn errors(&self) -> Vec<HostkeepError> {
        self.failed
            .iter()
            .map(|(section, reason)| HostkeepError::RestoreSection {
                section: section.clone(),
                reason: reason.clone(),
            })
            .collect()
    }
}

/// Replays archives onto the host
pub struct RestoreEngine<'a> {
    runtime: &'a dyn ContainerRuntime,
    scratch_root: PathBuf,
    journal: Option<&'a Journal>,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, scratch_root: PathBuf) -> Self {
        Self {
            runtime,
            scratch_root,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Extract and validate an archive
    ///
    /// # Errors
    ///
    /// Fails when the archive cannot be extracted, has no readable manifest,
    /// or contains no section directory.
    pub fn open(&self, archive: &Path) -> HostkeepResult<OpenedArchive> {
        fs::create_dir_all(&self.scratch_root)?;
        let scratch = TempDir::new_in(&self.scratch_root).map_err(|e| {
            HostkeepError::Io(format!("Failed to create scratch directory: {}", e))
        })?;
        unpack(archive, scratch.path())?;

        let manifest_path = scratch.path().join(MANIFEST_FILE);
        let json = fs::read_to_string(&manifest_path).map_err(|_| {
            HostkeepError::Archive(format!("{} has no {}", archive.display(), MANIFEST_FILE))
        })?;
        let manifest: BackupManifest = serde_json::from_str(&json).map_err(|e| {
            HostkeepError::Archive(format!("Invalid manifest in {}: {}", archive.display(), e))
        })?;

        let has_section_dir = SectionKind::ALL
            .iter()
            .any(|k| scratch.path().join(k.dir_name()).is_dir());
        if !has_section_dir {
            return Err(HostkeepError::Archive(format!(
                "{} contains no section data",
                archive.display()
            )));
        }

        Ok(OpenedArchive { scratch, manifest })
    }

    /// Validate an archive without touching the host
    pub fn validate(&self, archive: &Path) -> HostkeepResult<ValidationResult> {
        let opened = self.open(archive)?;
        Ok(validation_of(&opened.manifest))
    }

    /// Restore an archive onto the host
    pub fn restore(
        &self,
        archive: &Path,
        options: RestoreOptions,
        prompter: &dyn Prompter,
    ) -> HostkeepResult<RestoreSummary> {
        let opened = self.open(archive)?;
        let manifest = &opened.manifest;
        let mut summary = RestoreSummary {
            archive: manifest.id.clone(),
            dry_run: options.dry_run,
            validation: Some(validation_of(manifest)),
            ..RestoreSummary::default()
        };

        if options.dry_run {
            return Ok(summary);
        }

        if !options.assume_yes {
            let question = format!(
                "Restore {} ({} section(s)) over the current host state?",
                manifest.id,
                manifest.sections.len()
            );
            if !prompter.confirm(&question)? {
                summary.cancelled = true;
                return Ok(summary);
            }
        }

        let mut to_restart = BTreeSet::new();

        for section in &manifest.sections {
            let id = section.id();
            if !section.is_ok() {
                info!(section = %id, status = %section.status, "not captured, skipping");
                self.record(&id, Outcome::Skipped, section.message.as_deref());
                summary.skipped.push(id);
                continue;
            }

            match self.replay(opened.root(), section) {
                Ok(()) => {
                    info!(section = %id, "restored");
                    self.record(&id, Outcome::Ok, None);
                    to_restart.extend(self.dependents(section));
                    summary.restored.push(id);
                }
                Err(e) => {
                    let err = HostkeepError::RestoreSection {
                        section: id.clone(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "section restore failed, continuing");
                    self.record(&id, Outcome::Failed, Some(&e.to_string()));
                    summary.failed.push((id, e.to_string()));
                }
            }
        }

        for container in to_restart {
            match self.runtime.restart(&container) {
                Ok(()) => summary.restarted.push(container),
                Err(e) => warn!(container = %container, error = %e, "could not restart container"),
            }
        }

        Ok(summary)
    }

    fn replay(&self, root: &Path, section: &Section) -> HostkeepResult<()> {
        let artifact = section.artifact.as_deref().ok_or_else(|| {
            HostkeepError::Archive(format!("section {} has no artifact", section.id()))
        })?;
        let path = root.join(artifact);
        if !path.is_file() {
            return Err(HostkeepError::Archive(format!("{} is missing from the archive", artifact)));
        }

        match section.kind {
            SectionKind::VolumeSnapshot => self.runtime.import_volume(&section.source, &path),
            SectionKind::ConfigSnapshot | SectionKind::UserData => {
                let parent = Path::new(&section.source)
                    .parent()
                    .unwrap_or_else(|| Path::new("/"));
                unpack_path(&path, parent)
            }
            SectionKind::DatabaseDump => {
                let engine = section.engine.ok_or_else(|| {
                    HostkeepError::Archive(format!("section {} has no engine", section.id()))
                })?;
                self.runtime
                    .exec_from_file(&section.source, &engine.restore_command(), &path)
            }
        }
    }

    /// Containers to restart once `section` is back
    fn dependents(&self, section: &Section) -> Vec<String> {
        match section.kind {
            SectionKind::DatabaseDump => vec![section.source.clone()],
            SectionKind::VolumeSnapshot => self
                .runtime
                .containers_using_volume(&section.source)
                .unwrap_or_else(|e| {
                    warn!(volume = %section.source, error = %e, "could not list dependent containers");
                    Vec::new()
                }),
            _ => Vec::new(),
        }
    }

    fn record(&self, section: &str, outcome: Outcome, message: Option<&str>) {
        if let Some(journal) = self.journal {
            journal.record(Scope::Restore, section, outcome, message);
        }
    }
}

fn validation_of(manifest: &BackupManifest) -> ValidationResult {
    let (ok, not): (Vec<&Section>, Vec<&Section>) =
        manifest.sections.iter().partition(|s| s.is_ok());
    ValidationResult {
        id: manifest.id.clone(),
        created_at: manifest.created_at,
        restorable: ok.iter().map(|s| s.id()).collect(),
        not_captured: not.iter().map(|s| s.id()).collect(),
    }
}
