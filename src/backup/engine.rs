//! Backup Engine
//!
//! Captures every configured section into a set directory, seals it with a
//! manifest and compresses it into a single archive. A failing section never
//! stops the others; it is recorded in the manifest instead.
//!
//! ## Lifecycle
//!
//! `Capturing -> Sealed -> Uploaded -> Pruned`. A set is sealed only after
//! every section was attempted, and only a sealed set is compressed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::{BackupSettings, Strictness};
use crate::error::{HostkeepError, HostkeepResult};
use crate::host::ContainerRuntime;
use crate::journal::{Journal, Outcome, Scope};
use crate::storage::write_json_atomic;

use super::archive::{pack_path, pack_set, ARCHIVE_SUFFIX};
use super::database::DatabaseEngine;
use super::manifest::{BackupManifest, BackupStatus, MANIFEST_FILE};
use super::replicator::{UploadOutcome, UploadResult};
use super::retention::PruneReport;
use super::section::{CaptureStatus, Section, SectionKind};

/// Lifecycle state of a backup set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackupState {
    Capturing,
    Sealed,
    Uploaded,
    Pruned,
}

impl BackupState {
    /// Whether `self -> next` is a legal lifecycle move
    pub fn can_advance(self, next: BackupState) -> bool {
        matches!(
            (self, next),
            (BackupState::Capturing, BackupState::Sealed)
                | (BackupState::Sealed, BackupState::Uploaded)
                | (BackupState::Sealed, BackupState::Pruned)
                | (BackupState::Uploaded, BackupState::Pruned)
        )
    }
}

/// Id for a set created at `at`: `backup-YYYYMMDD-HHMMSS-mmm`
pub fn backup_id(at: DateTime<Utc>) -> String {
    format!(
        "backup-{}-{:03}",
        at.format("%Y%m%d-%H%M%S"),
        at.timestamp_subsec_millis()
    )
}

/// One backup attempt
#[derive(Debug)]
pub struct BackupSet {
    id: String,
    created_at: DateTime<Utc>,
    dir: PathBuf,
    sections: Vec<Section>,
    state: BackupState,
}

impl BackupSet {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn state(&self) -> BackupState {
        self.state
    }

    /// Move forward one lifecycle state
    pub fn advance(&mut self, next: BackupState) -> HostkeepResult<()> {
        if !self.state.can_advance(next) {
            return Err(HostkeepError::Validation(format!(
                "backup set {} cannot go from {:?} to {:?}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    fn require(&self, state: BackupState) -> HostkeepResult<()> {
        if self.state != state {
            return Err(HostkeepError::Validation(format!(
                "backup set {} is {:?}, expected {:?}",
                self.id, self.state, state
            )));
        }
        Ok(())
    }
}

/// Result of a full backup run
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub archive: PathBuf,
    pub archive_bytes: u64,
    pub manifest: BackupManifest,
    pub duration: Duration,
    /// Lifecycle state of the archive; `Sealed` when the run returns
    pub state: BackupState,
}

impl BackupReport {
    pub fn status(&self) -> BackupStatus {
        self.manifest.status
    }

    pub fn filename(&self) -> String {
        self.archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Move to `Uploaded` if a sync pass shipped this archive
    pub fn record_uploads(&mut self, uploads: &[UploadResult]) {
        let filename = self.filename();
        let shipped = uploads.iter().any(|u| {
            u.archive == filename
                && matches!(
                    u.outcome,
                    UploadOutcome::Uploaded { .. } | UploadOutcome::AlreadyUploaded
                )
        });
        if shipped {
            self.move_to(BackupState::Uploaded);
        }
    }

    /// Move to `Pruned` if a retention pass deleted this archive
    pub fn record_prune(&mut self, pruned: &PruneReport) {
        if pruned.deleted.iter().any(|p| *p == self.archive) {
            self.move_to(BackupState::Pruned);
        }
    }

    fn move_to(&mut self, next: BackupState) {
        if self.state.can_advance(next) {
            self.state = next;
        }
    }

    /// Sections that were not captured
    pub fn degraded(&self) -> impl Iterator<Item = &Section> {
        self.manifest.sections.iter().filter(|s| !s.is_ok())
    }

    /// Apply the configured strictness to a degraded result
    ///
    /// The archive is kept either way.
    pub fn enforce(&self, strictness: Strictness) -> HostkeepResult<()> {
        if strictness == Strictness::Warn || self.status() == BackupStatus::Complete {
            return Ok(());
        }
        let ids: Vec<String> = self.degraded().map(Section::id).collect();
        Err(HostkeepError::SectionCapture {
            section: ids.join(", "),
            reason: format!("backup {} is {}", self.manifest.id, self.status().label()),
        })
    }
}

/// Captures, seals and compresses backup sets
pub struct BackupEngine<'a> {
    runtime: &'a dyn ContainerRuntime,
    settings: &'a BackupSettings,
    backup_dir: PathBuf,
    journal: Option<&'a Journal>,
}

impl<'a> BackupEngine<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        settings: &'a BackupSettings,
        backup_dir: PathBuf,
    ) -> Self {
        Self {
            runtime,
            settings,
            backup_dir,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Capture everything configured and produce an archive
    pub fn run(&self) -> HostkeepResult<BackupReport> {
        let started = Instant::now();
        let mut set = self.begin()?;

        for volume in self.volume_targets(&mut set) {
            self.capture(&mut set, SectionKind::VolumeSnapshot, &volume)?;
        }
        for path in &self.settings.config_paths {
            self.capture(&mut set, SectionKind::ConfigSnapshot, path)?;
        }
        for container in self.database_targets(&mut set) {
            self.capture(&mut set, SectionKind::DatabaseDump, &container)?;
        }
        for path in &self.settings.user_paths {
            self.capture(&mut set, SectionKind::UserData, path)?;
        }

        let manifest = self.seal(&mut set)?;
        let (archive, archive_bytes) = self.compress(&set)?;

        info!(
            id = %manifest.id,
            status = manifest.status.label(),
            bytes = archive_bytes,
            "backup sealed"
        );
        Ok(BackupReport {
            archive,
            archive_bytes,
            manifest,
            duration: started.elapsed(),
            state: set.state,
        })
    }

    /// Start a new set in `Capturing` state
    pub fn begin(&self) -> HostkeepResult<BackupSet> {
        let created_at = Utc::now();
        let id = backup_id(created_at);
        let dir = self.backup_dir.join(&id);
        fs::create_dir_all(&dir).map_err(|e| {
            HostkeepError::Io(format!("Failed to create backup set {}: {}", dir.display(), e))
        })?;
        if let Some(journal) = self.journal {
            journal.record(Scope::Run, &id, Outcome::Started, None);
        }

        Ok(BackupSet {
            id,
            created_at,
            dir,
            sections: Vec::new(),
            state: BackupState::Capturing,
        })
    }

    /// Capture one section; a capture failure is recorded, never returned
    ///
    /// # Errors
    ///
    /// Only when the set is no longer capturing.
    pub fn capture<'s>(
        &self,
        set: &'s mut BackupSet,
        kind: SectionKind,
        source: &str,
    ) -> HostkeepResult<&'s Section> {
        set.require(BackupState::Capturing)?;

        let mut target = None;
        let section = match self.capture_section(&set.dir, kind, source, &mut target) {
            Ok(section) => section,
            Err(e) => {
                if let Some(partial) = target.filter(|p| p.exists()) {
                    if let Err(rm) = fs::remove_file(&partial) {
                        warn!(path = %partial.display(), error = %rm, "could not remove partial artifact");
                    }
                }
                Section::failed(kind, source, e.to_string())
            }
        };
        self.record(&section);
        set.sections.push(section);
        Ok(&set.sections[set.sections.len() - 1])
    }

    fn record(&self, section: &Section) {
        let id = section.id();
        match section.status {
            CaptureStatus::Ok => info!(section = %id, bytes = section.size_bytes, "captured"),
            _ => warn!(
                section = %id,
                reason = section.message.as_deref().unwrap_or(""),
                "section not captured"
            ),
        }
        if let Some(journal) = self.journal {
            let outcome = match section.status {
                CaptureStatus::Ok => Outcome::Ok,
                CaptureStatus::Warn => Outcome::Warn,
                CaptureStatus::Failed => Outcome::Failed,
            };
            journal.record(Scope::Section, &id, outcome, section.message.as_deref());
        }
    }

    /// `target` is set to the artifact path before anything is written to it
    fn capture_section(
        &self,
        set_dir: &Path,
        kind: SectionKind,
        source: &str,
        target: &mut Option<PathBuf>,
    ) -> HostkeepResult<Section> {
        let dir = set_dir.join(kind.dir_name());
        fs::create_dir_all(&dir)?;

        match kind {
            SectionKind::VolumeSnapshot => {
                let name = unique_name(&dir, source, "tar.gz");
                let dest = target.insert(dir.join(&name));
                self.runtime.export_volume(source, dest)?;
                artifact(set_dir, kind, source, &name)
            }
            SectionKind::ConfigSnapshot | SectionKind::UserData => {
                let path = Path::new(source);
                if !path.exists() {
                    return Err(HostkeepError::SectionCapture {
                        section: format!("{}:{}", kind.prefix(), source),
                        reason: "path does not exist".into(),
                    });
                }
                let base = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "root".into());
                let name = unique_name(&dir, &base, "tar");
                let dest = target.insert(dir.join(&name));
                pack_path(path, dest)?;
                artifact(set_dir, kind, source, &name)
            }
            SectionKind::DatabaseDump => {
                let env = self.runtime.container_env(source)?;
                let Some(engine) = DatabaseEngine::detect(&env) else {
                    return Ok(Section::warn(kind, source, "unknown database engine, skipped"));
                };
                let name = unique_name(&dir, source, engine.extension());
                let dest = target.insert(dir.join(&name));
                self.runtime
                    .exec_to_file(source, &engine.dump_command(), dest)?;
                Ok(artifact(set_dir, kind, source, &name)?.with_engine(engine))
            }
        }
    }

    fn volume_targets(&self, set: &mut BackupSet) -> Vec<String> {
        if !self.settings.volumes.is_empty() {
            return self.settings.volumes.clone();
        }
        match self.runtime.list_volumes() {
            Ok(volumes) => volumes,
            Err(e) => {
                let section = Section::failed(SectionKind::VolumeSnapshot, "*", e.to_string());
                self.record(&section);
                set.sections.push(section);
                Vec::new()
            }
        }
    }

    /// Explicit containers, or every running container with a known engine
    fn database_targets(&self, set: &mut BackupSet) -> Vec<String> {
        if !self.settings.databases.is_empty() {
            return self.settings.databases.clone();
        }
        match self.runtime.running_containers() {
            Ok(containers) => containers
                .into_iter()
                .filter(|c| {
                    self.runtime
                        .container_env(c)
                        .map(|env| DatabaseEngine::detect(&env).is_some())
                        .unwrap_or(false)
                })
                .collect(),
            Err(e) => {
                let section = Section::warn(SectionKind::DatabaseDump, "*", e.to_string());
                self.record(&section);
                set.sections.push(section);
                Vec::new()
            }
        }
    }

    /// Write the manifest; the set becomes `Sealed`
    pub fn seal(&self, set: &mut BackupSet) -> HostkeepResult<BackupManifest> {
        set.require(BackupState::Capturing)?;
        let manifest = BackupManifest::new(set.id.clone(), set.created_at, set.sections.clone());
        write_json_atomic(set.dir.join(MANIFEST_FILE), &manifest)?;
        set.advance(BackupState::Sealed)?;
        Ok(manifest)
    }

    /// Compress a sealed set and remove its directory
    pub fn compress(&self, set: &BackupSet) -> HostkeepResult<(PathBuf, u64)> {
        set.require(BackupState::Sealed)?;
        let dest = self
            .backup_dir
            .join(format!("{}{}", set.id, ARCHIVE_SUFFIX));
        let bytes = pack_set(&set.dir, &dest)?;
        if let Err(e) = fs::remove_dir_all(&set.dir) {
            warn!(dir = %set.dir.display(), error = %e, "could not remove uncompressed set");
        }
        if let Some(journal) = self.journal {
            journal.record(Scope::Run, &set.id, Outcome::Ok, Some(&dest.display().to_string()));
        }
        Ok((dest, bytes))
    }
}

fn artifact(set_dir: &Path, kind: SectionKind, source: &str, name: &str) -> HostkeepResult<Section> {
    let relative = format!("{}/{}", kind.dir_name(), name);
    let size = fs::metadata(set_dir.join(&relative))?.len();
    Ok(Section::ok(kind, source, relative, size))
}

/// `<base>.<ext>`, or `<base>-N.<ext>` if taken
fn unique_name(dir: &Path, base: &str, ext: &str) -> String {
    let base: String = base
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let mut name = format!("{}.{}", base, ext);
    let mut n = 2;
    while dir.join(&name).exists() {
        name = format!("{}-{}.{}", base, n, ext);
        n += 1;
    }
    name
}
