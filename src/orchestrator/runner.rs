//! Sequential step execution
//!
//! Steps run strictly one after another in the resolved order. A step whose
//! predicate is false is `NotApplicable`; a step whose desired state already
//! holds is `AlreadySatisfied` and is not touched. Only the remaining steps
//! are applied. After the run a read-only verification pass checks every
//! step that was applied or already satisfied.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::ConfigSnapshot;
use crate::error::{HostkeepError, HostkeepResult};
use crate::journal::{Journal, Outcome, Scope};

use super::plan::order_steps;
use super::step::{FailurePolicy, InstallationStep};

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    NotApplicable,
    AlreadySatisfied,
    Applied,
    /// Failed under `warn-continue`
    Failed { reason: String },
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::NotApplicable => "not applicable",
            StepOutcome::AlreadySatisfied => "already satisfied",
            StepOutcome::Applied => "applied",
            StepOutcome::Failed { .. } => "failed",
        }
    }

    /// Whether the step was reached and applicable, including failures
    fn attempted(&self) -> bool {
        !matches!(self, StepOutcome::NotApplicable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub id: String,
    pub outcome: StepOutcome,
}

/// Result of one read-only verification check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub id: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// Summary of an orchestration run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub verification: Vec<CheckResult>,
    pub journal: PathBuf,
}

impl RunReport {
    pub fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.outcome)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|o| *o == StepOutcome::Applied)
    }

    /// Steps that failed under `warn-continue`
    pub fn warnings(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
    }

    pub fn verification_passed(&self) -> bool {
        self.verification.iter().all(|c| c.passed)
    }
}

/// Runs an ordered set of installation steps against one configuration
pub struct PhaseOrchestrator<'a> {
    steps: Vec<Box<dyn InstallationStep>>,
    journal: &'a Journal,
}

impl<'a> PhaseOrchestrator<'a> {
    /// Resolve the execution order up front
    ///
    /// # Errors
    ///
    /// Fails with [`HostkeepError::Plan`] when the steps do not form a valid
    /// partial order. Nothing has executed at that point.
    pub fn new(steps: Vec<Box<dyn InstallationStep>>, journal: &'a Journal) -> HostkeepResult<Self> {
        Ok(Self {
            steps: order_steps(steps)?,
            journal,
        })
    }

    /// Step ids in execution order
    pub fn order(&self) -> Vec<&str> {
        self.steps
            .iter()
            .map(|s| s.descriptor().id.as_str())
            .collect()
    }

    /// Execute every step, then verify
    ///
    /// # Errors
    ///
    /// An `abort-run` step failure stops the run and returns
    /// [`HostkeepError::StepFailure`] naming the journal. Steps already
    /// applied stay applied.
    pub fn run(&self, config: &ConfigSnapshot) -> HostkeepResult<RunReport> {
        self.journal
            .record(Scope::Run, "install", Outcome::Started, None);
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let descriptor = step.descriptor();
            let id = descriptor.id.as_str();

            let outcome = match self.execute(step.as_ref(), config) {
                Ok(outcome) => outcome,
                Err(e) => match descriptor.on_failure {
                    FailurePolicy::AbortRun => {
                        error!(step = id, error = %e, "step failed, aborting run");
                        self.journal
                            .record(Scope::Step, id, Outcome::Failed, Some(&e.to_string()));
                        self.journal.record(
                            Scope::Run,
                            "install",
                            Outcome::Failed,
                            Some(&format!("aborted at step '{}'", id)),
                        );
                        return Err(HostkeepError::StepFailure {
                            step: id.to_string(),
                            reason: e.to_string(),
                            log: self.journal.path().to_path_buf(),
                        });
                    }
                    FailurePolicy::WarnContinue => {
                        warn!(step = id, error = %e, "step failed, continuing");
                        self.journal
                            .record(Scope::Step, id, Outcome::Warn, Some(&e.to_string()));
                        StepOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                },
            };

            reports.push(StepReport {
                id: id.to_string(),
                outcome,
            });
        }

        let attempted: Vec<&str> = reports
            .iter()
            .filter(|r| r.outcome.attempted())
            .map(|r| r.id.as_str())
            .collect();
        let verification = self.check(config, |id| attempted.contains(&id));

        self.journal.record(Scope::Run, "install", Outcome::Ok, None);
        Ok(RunReport {
            steps: reports,
            verification,
            journal: self.journal.path().to_path_buf(),
        })
    }

    fn execute(
        &self,
        step: &dyn InstallationStep,
        config: &ConfigSnapshot,
    ) -> HostkeepResult<StepOutcome> {
        let id = step.descriptor().id.as_str();

        if !step.descriptor().applies(config) {
            info!(step = id, "not applicable");
            self.journal
                .record(Scope::Step, id, Outcome::Skipped, Some("not applicable"));
            return Ok(StepOutcome::NotApplicable);
        }

        if step.is_satisfied(config)? {
            info!(step = id, "already satisfied");
            self.journal
                .record(Scope::Step, id, Outcome::Skipped, Some("already satisfied"));
            return Ok(StepOutcome::AlreadySatisfied);
        }

        self.journal.record(Scope::Step, id, Outcome::Started, None);
        step.apply(config)?;
        info!(step = id, "applied");
        self.journal.record(Scope::Step, id, Outcome::Ok, None);
        Ok(StepOutcome::Applied)
    }

    /// Read-only verification of every applicable step
    pub fn verify(&self, config: &ConfigSnapshot) -> Vec<CheckResult> {
        self.check(config, |_| true)
    }

    fn check(&self, config: &ConfigSnapshot, include: impl Fn(&str) -> bool) -> Vec<CheckResult> {
        self.steps
            .iter()
            .filter(|s| s.descriptor().applies(config) && include(&s.descriptor().id))
            .map(|step| {
                let id = step.descriptor().id.clone();
                let (passed, message) = match step.verify(config) {
                    Ok(true) => (true, None),
                    Ok(false) => (false, Some("desired state does not hold".to_string())),
                    Err(e) => (false, Some(e.to_string())),
                };
                let outcome = if passed { Outcome::Ok } else { Outcome::Failed };
                self.journal
                    .record(Scope::Verify, &id, outcome, message.as_deref());
                CheckResult {
                    id,
                    passed,
                    message,
                }
            })
            .collect()
    }
}
