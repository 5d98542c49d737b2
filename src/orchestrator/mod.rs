//! Phase Orchestrator
//!
//! Sequences idempotent installation/hardening steps declared in a
//! [`PhasePlan`], after the fetcher has verified every step artifact.

pub mod install;
pub mod plan;
pub mod runner;
pub mod step;

pub use install::{install, verify};
pub use plan::{order_steps, PhasePlan, PlannedStep};
pub use runner::{CheckResult, PhaseOrchestrator, RunReport, StepOutcome, StepReport};
pub use step::{
    FailurePolicy, InstallationStep, RunWhen, ScriptStep, StepCategory, StepDescriptor,
};
