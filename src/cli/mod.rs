//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the engines.

pub mod backup;
pub mod install;

use crate::config::{ConfigResolver, ConfigSnapshot, HostkeepPaths, Settings};
use crate::error::HostkeepResult;
use crate::host::{Prompter, RunLock, TerminalPrompter};
use crate::journal::Journal;

pub use backup::{
    handle_backup, handle_list, handle_prune, handle_restore, handle_sync, RestoreArgs,
};
pub use install::{handle_config, handle_install, PlanArgs};

/// Everything a handler needs from the invocation
pub struct CliContext {
    pub paths: HostkeepPaths,
    pub prompter: Box<dyn Prompter>,
    pub journal: Journal,
}

impl CliContext {
    /// Prepare directories and pick a prompter
    pub fn new(paths: HostkeepPaths, non_interactive: bool) -> HostkeepResult<Self> {
        paths.ensure_directories()?;
        let journal = Journal::new(paths.journal_file());
        Ok(Self {
            paths,
            prompter: TerminalPrompter::detect(non_interactive),
            journal,
        })
    }

    /// A resolver over the persisted settings
    pub fn resolver(&self, settings: &Settings) -> ConfigResolver<'_> {
        ConfigResolver::new(settings, self.prompter.as_ref())
    }

    /// Resolve every documented key without prompting, and persist
    pub fn snapshot(&self) -> HostkeepResult<ConfigSnapshot> {
        let settings = Settings::load_or_create(&self.paths)?;
        let mut resolver = self.resolver(&settings);
        resolver.resolve_known(false)?;
        resolver.finish(&self.paths)
    }

    /// Take the run lock; held until the returned guard drops
    pub fn lock(&self) -> HostkeepResult<RunLock> {
        RunLock::acquire(&self.paths.lock_file())
    }
}
