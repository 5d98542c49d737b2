//! Installation step model
//!
//! A step is described declaratively by a [`StepDescriptor`] and does its
//! work through the [`InstallationStep`] trait. Every call receives the same
//! immutable [`ConfigSnapshot`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigSnapshot;
use crate::error::{HostkeepError, HostkeepResult};
use crate::host::Cmd;

/// Ordering category of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepCategory {
    #[default]
    Normal,
    /// Runs after every normal step
    MustRunLast,
}

/// What a failing step does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    AbortRun,
    WarnContinue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::AbortRun => write!(f, "abort-run"),
            FailurePolicy::WarnContinue => write!(f, "warn-continue"),
        }
    }
}

/// Run predicate over the configuration snapshot
///
/// Without `equals` the key must be set to a truthy value; with it the
/// value must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWhen {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
}

impl RunWhen {
    pub fn holds(&self, config: &ConfigSnapshot) -> bool {
        match &self.equals {
            Some(expected) => config.get(&self.key) == Some(expected.as_str()),
            None => config.get_bool(&self.key),
        }
    }
}

/// Declarative description of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub id: String,
    pub when: Option<RunWhen>,
    pub category: StepCategory,
    /// Ids of steps that must complete first
    pub after: Vec<String>,
    pub on_failure: FailurePolicy,
}

impl StepDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            when: None,
            category: StepCategory::Normal,
            after: Vec::new(),
            on_failure: FailurePolicy::AbortRun,
        }
    }

    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.after.push(dep.into());
        self
    }

    pub fn must_run_last(mut self) -> Self {
        self.category = StepCategory::MustRunLast;
        self
    }

    pub fn warn_continue(mut self) -> Self {
        self.on_failure = FailurePolicy::WarnContinue;
        self
    }

    pub fn when(mut self, predicate: RunWhen) -> Self {
        self.when = Some(predicate);
        self
    }

    /// Whether the step applies under this configuration
    pub fn applies(&self, config: &ConfigSnapshot) -> bool {
        self.when.as_ref().map(|w| w.holds(config)).unwrap_or(true)
    }
}

/// One unit of installation or hardening work
///
/// `is_satisfied` and `verify` must not mutate the host. `apply` is only
/// called when `is_satisfied` returned false.
pub trait InstallationStep {
    fn descriptor(&self) -> &StepDescriptor;

    fn is_satisfied(&self, config: &ConfigSnapshot) -> HostkeepResult<bool>;

    fn apply(&self, config: &ConfigSnapshot) -> HostkeepResult<()>;

    fn verify(&self, config: &ConfigSnapshot) -> HostkeepResult<bool>;
}

/// A verified shell script implementing the `check` / `apply` protocol
///
/// `sh <script> check` exits 0 when the desired state already holds;
/// `sh <script> apply` brings the host into that state. The configuration
/// snapshot is exported into the script's environment.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    descriptor: StepDescriptor,
    script: PathBuf,
}

impl ScriptStep {
    pub fn new(descriptor: StepDescriptor, script: PathBuf) -> Self {
        Self { descriptor, script }
    }

    fn command(&self, action: &str, config: &ConfigSnapshot) -> Cmd {
        let mut cmd = Cmd::new("sh").arg_path(&self.script).arg(action);
        for (key, value) in config.iter() {
            cmd = cmd.env(key, value);
        }
        cmd.env("HOSTKEEP_STEP", &self.descriptor.id)
    }

    fn check(&self, config: &ConfigSnapshot) -> HostkeepResult<bool> {
        let result = self.command("check", config).allow_fail().run()?;
        debug!(step = %self.descriptor.id, code = result.code(), "check finished");
        Ok(result.success())
    }
}

impl InstallationStep for ScriptStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn is_satisfied(&self, config: &ConfigSnapshot) -> HostkeepResult<bool> {
        self.check(config)
    }

    fn apply(&self, config: &ConfigSnapshot) -> HostkeepResult<()> {
        self.command("apply", config)
            .run()
            .map(|_| ())
            .map_err(|e| match e {
                HostkeepError::Command { code, stderr, .. } => HostkeepError::Command {
                    program: format!("{} apply", self.script.display()),
                    code,
                    stderr,
                },
                other => other,
            })
    }

    fn verify(&self, config: &ConfigSnapshot) -> HostkeepResult<bool> {
        self.check(config)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory steps over a shared fake host

    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use super::*;

    /// Host state shared between fake steps: the set of applied markers plus
    /// the order in which `apply` calls happened
    #[derive(Debug, Default)]
    pub struct FakeHost {
        pub state: BTreeSet<String>,
        pub applied: Vec<String>,
    }

    pub type SharedHost = Rc<RefCell<FakeHost>>;

    pub struct MarkerStep {
        pub descriptor: StepDescriptor,
        pub host: SharedHost,
        pub fail_apply: bool,
    }

    impl MarkerStep {
        pub fn new(descriptor: StepDescriptor, host: &SharedHost) -> Self {
            Self {
                descriptor,
                host: Rc::clone(host),
                fail_apply: false,
            }
        }

        pub fn failing(mut self) -> Self {
            self.fail_apply = true;
            self
        }
    }

    impl InstallationStep for MarkerStep {
        fn descriptor(&self) -> &StepDescriptor {
            &self.descriptor
        }

        fn is_satisfied(&self, _config: &ConfigSnapshot) -> HostkeepResult<bool> {
            Ok(self.host.borrow().state.contains(&self.descriptor.id))
        }

        fn apply(&self, _config: &ConfigSnapshot) -> HostkeepResult<()> {
            if self.fail_apply {
                return Err(HostkeepError::Validation(format!(
                    "{} refused to apply",
                    self.descriptor.id
                )));
            }
            let mut host = self.host.borrow_mut();
            host.state.insert(self.descriptor.id.clone());
            host.applied.push(self.descriptor.id.clone());
            Ok(())
        }

        fn verify(&self, config: &ConfigSnapshot) -> HostkeepResult<bool> {
            self.is_satisfied(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_run_when() {
        let config = ConfigSnapshot::from_pairs([("FIREWALL", "yes"), ("MAIL", "postfix")]);

        let truthy = RunWhen {
            key: "FIREWALL".into(),
            equals: None,
        };
        let equals = RunWhen {
            key: "MAIL".into(),
            equals: Some("exim".into()),
        };
        assert!(truthy.holds(&config));
        assert!(!equals.holds(&config));
        assert!(StepDescriptor::new("x").applies(&config));
    }

    #[test]
    fn test_category_serde() {
        let parsed: StepCategory = serde_yaml::from_str("must-run-last").unwrap();
        assert_eq!(parsed, StepCategory::MustRunLast);
        let parsed: FailurePolicy = serde_yaml::from_str("warn-continue").unwrap();
        assert_eq!(parsed, FailurePolicy::WarnContinue);
    }

    #[test]
    fn test_script_step_protocol() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("marker");
        let script = temp.path().join("step.sh");
        fs::write(
            &script,
            r#"case "$1" in
  check) test -f "$MARKER" ;;
  apply) echo "$HOSTKEEP_STEP" > "$MARKER" ;;
esac
"#,
        )
        .unwrap();

        let config =
            ConfigSnapshot::from_pairs([("MARKER", marker.to_string_lossy().into_owned())]);
        let step = ScriptStep::new(StepDescriptor::new("marker"), script);

        assert!(!step.is_satisfied(&config).unwrap());
        step.apply(&config).unwrap();
        assert!(step.is_satisfied(&config).unwrap());
        assert!(step.verify(&config).unwrap());
        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "marker");
    }

    #[test]
    fn test_script_apply_failure() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("step.sh");
        fs::write(&script, "echo broken >&2; exit 4\n").unwrap();

        let step = ScriptStep::new(StepDescriptor::new("broken"), script);
        let err = step.apply(&ConfigSnapshot::default()).unwrap_err();
        match err {
            HostkeepError::Command { code, stderr, .. } => {
                assert_eq!(code, 4);
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
