//! Installation CLI commands
//!
//! `install` resolves configuration, verifies every artifact and runs the
//! plan; `verify` re-runs only the read-only checks.

use std::fs;
use std::path::Path;

use clap::Args;
use tracing::info;

use crate::config::{keys, ConfigResolver, Settings};
use crate::display::{format_checks, format_config, format_run_report};
use crate::error::{HostkeepError, HostkeepResult};
use crate::fetch::source::is_remote;
use crate::fetch::{AnySource, ArtifactSource, Fetcher, GpgSignatureCheck};
use crate::orchestrator::{self, PhasePlan};

use super::CliContext;

/// Arguments shared by `install` and `verify`
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Path or URL of the phase plan (defaults to PHASE_PLAN)
    #[arg(long)]
    pub plan: Option<String>,
}

/// Run the install pipeline, or only its verification pass
pub fn handle_install(ctx: &CliContext, args: PlanArgs, verify_only: bool) -> HostkeepResult<()> {
    let _lock = ctx.lock()?;
    let settings = Settings::load_or_create(&ctx.paths)?;
    let mut resolver = ctx.resolver(&settings);
    resolver.resolve_known(args.plan.is_none())?;

    let location = plan_location(&mut resolver, args.plan)?;
    let plan = load_plan(ctx, &location)?;
    info!(plan = %location, steps = plan.steps.len(), "loaded phase plan");

    resolver.resolve_required(&plan.required)?;
    resolver.validate_required(&plan.required)?;
    let snapshot = resolver.finish(&ctx.paths)?;

    let source = AnySource::default();
    let fetcher = Fetcher::new(&source, &GpgSignatureCheck, ctx.paths.staging_dir())
        .with_journal(&ctx.journal);

    if verify_only {
        let checks = orchestrator::verify(&plan, &snapshot, &fetcher, &ctx.journal)?;
        print!("{}", format_checks(&checks));
        let failed = checks.iter().filter(|c| !c.passed).count();
        if failed > 0 {
            return Err(HostkeepError::Validation(format!(
                "{} of {} check(s) failed",
                failed,
                checks.len()
            )));
        }
        return Ok(());
    }

    let report = orchestrator::install(&plan, &snapshot, &fetcher, &ctx.journal)?;
    print!("{}", format_run_report(&report));
    if !report.verification_passed() {
        return Err(HostkeepError::Validation(format!(
            "verification failed after install (see {})",
            ctx.journal.path().display()
        )));
    }
    Ok(())
}

/// Show the resolved configuration and where it lives
pub fn handle_config(ctx: &CliContext) -> HostkeepResult<()> {
    let settings = Settings::load_or_create(&ctx.paths)?;
    let mut resolver = ctx.resolver(&settings);
    resolver.resolve_known(false)?;
    print!("{}", format_config(&ctx.paths, &resolver.into_snapshot()));
    Ok(())
}

fn plan_location(
    resolver: &mut ConfigResolver<'_>,
    explicit: Option<String>,
) -> HostkeepResult<String> {
    if let Some(location) = explicit {
        return Ok(location);
    }
    resolver.validate_required(&[keys::PHASE_PLAN])?;
    resolver
        .resolve(keys::PHASE_PLAN, None)?
        .ok_or_else(|| HostkeepError::MissingConfiguration {
            keys: vec![keys::PHASE_PLAN.to_string()],
        })
}

fn load_plan(ctx: &CliContext, location: &str) -> HostkeepResult<PhasePlan> {
    if !is_remote(location) {
        let path = location.strip_prefix("file://").unwrap_or(location);
        return PhasePlan::load(Path::new(path));
    }

    let dest = ctx.paths.state_dir().join("plan.yaml");
    AnySource::default().fetch(location, &dest)?;
    let text = fs::read_to_string(&dest)?;
    PhasePlan::from_yaml(&text, location)
}
