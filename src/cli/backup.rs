//! Backup CLI commands
//!
//! Implements `backup`, `restore`, `sync`, `prune` and `list`.

use clap::Args;
use tracing::info;

use crate::backup::replicator::enforce;
use crate::backup::{
    find_archive, list_archives, BackupEngine, CloudReplicator, RestoreEngine, RestoreOptions,
    RetentionManager, UploadLedger,
};
use crate::config::{BackupSettings, UploadSettings};
use crate::display::{
    format_archive_list, format_backup_report, format_prune_report, format_restore_summary,
    format_upload_results,
};
use crate::error::HostkeepResult;
use crate::host::DockerCli;

use super::CliContext;

/// Arguments for `hostkeep restore`
#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    /// Archive filename, id or path (omit to list archives)
    pub archive: Option<String>,

    /// Validate the archive without touching the host
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Capture, replicate and prune in one run
pub fn handle_backup(ctx: &CliContext) -> HostkeepResult<()> {
    let _lock = ctx.lock()?;
    let snapshot = ctx.snapshot()?;
    let settings = BackupSettings::from_snapshot(&snapshot)?;
    let upload = UploadSettings::from_snapshot(&snapshot)?;
    let runtime =
        DockerCli::new(settings.helper_image.clone()).with_binary(&settings.container_cli);
    let replicator = CloudReplicator::from_settings(&upload, ctx.paths.upload_ledger())?
        .with_journal(&ctx.journal);

    println!("Creating backup...");
    let mut report = BackupEngine::new(&runtime, &settings, ctx.paths.backup_dir())
        .with_journal(&ctx.journal)
        .run()?;
    print!("{}", format_backup_report(&report));

    let uploads = replicator.sync(&ctx.paths.backup_dir())?;
    report.record_uploads(&uploads);
    println!();
    print!("{}", format_upload_results(&uploads));

    let pruned = RetentionManager::new(ctx.paths.backup_dir(), settings.retention_days)
        .with_ledger(ctx.paths.upload_ledger())
        .with_journal(&ctx.journal)
        .prune()?;
    report.record_prune(&pruned);
    println!();
    print!("{}", format_prune_report(&pruned, settings.retention_days));
    info!(archive = %report.filename(), state = ?report.state, "backup run finished");

    report.enforce(settings.strictness)?;
    enforce(&uploads, upload.strictness)
}

/// Restore an archive, or list candidates when none is named
pub fn handle_restore(ctx: &CliContext, args: RestoreArgs) -> HostkeepResult<()> {
    let Some(name) = args.archive else {
        println!("No archive given. Available archives:");
        println!();
        handle_list(ctx)?;
        println!();
        println!("Restore one with: hostkeep restore <ARCHIVE>");
        return Ok(());
    };

    let archive = find_archive(&ctx.paths.backup_dir(), &name)?;
    let _lock = if args.dry_run {
        None
    } else {
        Some(ctx.lock()?)
    };
    let snapshot = ctx.snapshot()?;
    let settings = BackupSettings::from_snapshot(&snapshot)?;
    let runtime =
        DockerCli::new(settings.helper_image.clone()).with_binary(&settings.container_cli);

    let engine =
        RestoreEngine::new(&runtime, ctx.paths.scratch_dir()).with_journal(&ctx.journal);
    let options = RestoreOptions {
        dry_run: args.dry_run,
        assume_yes: args.yes,
    };
    let summary = engine.restore(&archive, options, ctx.prompter.as_ref())?;
    print!("{}", format_restore_summary(&summary));

    match summary.errors().into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}

/// Upload every archive not in the ledger yet
pub fn handle_sync(ctx: &CliContext) -> HostkeepResult<()> {
    let _lock = ctx.lock()?;
    let snapshot = ctx.snapshot()?;
    let upload = UploadSettings::from_snapshot(&snapshot)?;

    let results = CloudReplicator::from_settings(&upload, ctx.paths.upload_ledger())?
        .with_journal(&ctx.journal)
        .sync(&ctx.paths.backup_dir())?;
    print!("{}", format_upload_results(&results));

    enforce(&results, upload.strictness)
}

/// Run a retention pass on its own
pub fn handle_prune(ctx: &CliContext) -> HostkeepResult<()> {
    let _lock = ctx.lock()?;
    let snapshot = ctx.snapshot()?;
    let settings = BackupSettings::from_snapshot(&snapshot)?;

    let report = RetentionManager::new(ctx.paths.backup_dir(), settings.retention_days)
        .with_ledger(ctx.paths.upload_ledger())
        .with_journal(&ctx.journal)
        .prune()?;
    print!("{}", format_prune_report(&report, settings.retention_days));
    Ok(())
}

pub fn handle_list(ctx: &CliContext) -> HostkeepResult<()> {
    let archives = list_archives(&ctx.paths.backup_dir())?;
    let ledger = UploadLedger::load(&ctx.paths.upload_ledger())?;
    println!("{}", format_archive_list(&archives, &ledger).trim_end());
    Ok(())
}
