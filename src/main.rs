use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hostkeep::cli::{
    handle_backup, handle_config, handle_install, handle_list, handle_prune, handle_restore,
    handle_sync, CliContext, PlanArgs, RestoreArgs,
};
use hostkeep::config::HostkeepPaths;
use hostkeep::error::HostkeepError;

#[derive(Parser)]
#[command(
    name = "hostkeep",
    version,
    about = "Single-host backup/restore and idempotent installation phases",
    long_about = "hostkeep captures container volumes, configuration, databases and user \
                  data into self-describing archives, replicates and prunes them, and \
                  restores them. It also runs checksum-gated installation plans whose \
                  steps are skipped once the host already satisfies them."
)]
struct Cli {
    /// Never prompt; unresolved required settings are an error
    #[arg(long, global = true, env = "HOSTKEEP_NONINTERACTIVE")]
    non_interactive: bool,

    /// Increase log verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a backup, replicate it and apply retention
    Backup,

    /// Restore from an archive (lists archives when none is given)
    Restore(RestoreArgs),

    /// Upload archives that have not been replicated yet
    Sync,

    /// Delete archives past the retention window
    Prune,

    /// List local archives
    #[command(alias = "ls")]
    List,

    /// Verify artifacts and run the installation plan
    Install(PlanArgs),

    /// Run the read-only verification pass of the installation plan
    Verify(PlanArgs),

    /// Show current configuration and paths
    Config,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "hostkeep=info",
        1 => "hostkeep=debug",
        _ => "hostkeep=trace",
    };
    let filter = EnvFilter::try_from_env("HOSTKEEP_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Exit status for a failed run: 2 when the run completed but degraded
/// (a section or upload failed), 1 otherwise
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<HostkeepError>() {
        Some(e) if !e.is_fatal() => 2,
        _ => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = HostkeepPaths::new()?;
    let ctx = CliContext::new(paths, cli.non_interactive)?;

    match cli.command {
        Some(Commands::Backup) => handle_backup(&ctx)?,
        Some(Commands::Restore(args)) => handle_restore(&ctx, args)?,
        Some(Commands::Sync) => handle_sync(&ctx)?,
        Some(Commands::Prune) => handle_prune(&ctx)?,
        Some(Commands::List) => handle_list(&ctx)?,
        Some(Commands::Install(args)) => handle_install(&ctx, args, false)?,
        Some(Commands::Verify(args)) => handle_install(&ctx, args, true)?,
        Some(Commands::Config) => handle_config(&ctx)?,
        None => {
            println!("hostkeep - single-host backup/restore and installation phases");
            println!();
            println!("Run 'hostkeep --help' for usage information.");
            println!("Run 'hostkeep backup' to capture a backup now.");
        }
    }

    Ok(())
}
