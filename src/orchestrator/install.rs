//! The full install pipeline: verify, order, run

use tracing::info;

use crate::config::ConfigSnapshot;
use crate::error::HostkeepResult;
use crate::fetch::Fetcher;
use crate::journal::Journal;

use super::plan::PhasePlan;
use super::runner::{CheckResult, PhaseOrchestrator, RunReport};

/// Fetch and verify every artifact of `plan`, then run its steps
///
/// Verification covers the whole plan before the orchestrator exists, so an
/// integrity failure means no step has run.
pub fn install(
    plan: &PhasePlan,
    config: &ConfigSnapshot,
    fetcher: &Fetcher<'_>,
    journal: &Journal,
) -> HostkeepResult<RunReport> {
    let verified = fetcher.fetch_all(&plan.to_manifest())?;
    info!(artifacts = verified.len(), "all step artifacts verified");

    let orchestrator = PhaseOrchestrator::new(plan.build_steps(&verified)?, journal)?;
    orchestrator.run(config)
}

/// Verification pass only
pub fn verify(
    plan: &PhasePlan,
    config: &ConfigSnapshot,
    fetcher: &Fetcher<'_>,
    journal: &Journal,
) -> HostkeepResult<Vec<CheckResult>> {
    let verified = fetcher.fetch_all(&plan.to_manifest())?;
    let orchestrator = PhaseOrchestrator::new(plan.build_steps(&verified)?, journal)?;
    Ok(orchestrator.verify(config))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::error::HostkeepError;
    use crate::fetch::{sha256_file, LocalSource, SignatureCheck};
    use tempfile::TempDir;

    struct NoSignatures;

    impl SignatureCheck for NoSignatures {
        fn verify(&self, _a: &Path, _s: &Path) -> HostkeepResult<bool> {
            Ok(false)
        }
    }

    const STEP: &str = r#"case "$1" in
  check) test -f "$STATE_DIR/$HOSTKEEP_STEP" ;;
  apply) touch "$STATE_DIR/$HOSTKEEP_STEP" ;;
esac
"#;

    fn write_plan(dir: &Path, corrupt_second: bool) -> PhasePlan {
        fs::write(dir.join("one.sh"), STEP).unwrap();
        fs::write(dir.join("two.sh"), STEP).unwrap();
        let one = sha256_file(&dir.join("one.sh")).unwrap();
        let two = if corrupt_second {
            "f".repeat(64)
        } else {
            sha256_file(&dir.join("two.sh")).unwrap()
        };
        let yaml = format!(
            "steps:\n  - id: one\n    artifact: {{ location: one.sh, sha256: \"{one}\" }}\n  - id: two\n    artifact: {{ location: two.sh, sha256: \"{two}\" }}\n    after: [one]\n"
        );
        let path = dir.join("plan.yaml");
        fs::write(&path, yaml).unwrap();
        PhasePlan::load(&path).unwrap()
    }

    fn fixture(temp: &TempDir) -> (std::path::PathBuf, ConfigSnapshot) {
        let state = temp.path().join("host");
        fs::create_dir_all(&state).unwrap();
        let config = ConfigSnapshot::from_pairs([("STATE_DIR", state.to_string_lossy().into_owned())]);
        (state, config)
    }

    #[test]
    fn test_install_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path(), false);
        let (state, config) = fixture(&temp);
        let journal = Journal::new(temp.path().join("journal.log"));
        let fetcher = Fetcher::new(&LocalSource, &NoSignatures, temp.path().join("staging"));

        let first = install(&plan, &config, &fetcher, &journal).unwrap();
        assert_eq!(first.applied(), 2);
        assert!(state.join("one").exists() && state.join("two").exists());

        let second = install(&plan, &config, &fetcher, &journal).unwrap();
        assert_eq!(second.applied(), 0);
        assert!(second.verification_passed());
        assert_eq!(fs::read_dir(&state).unwrap().count(), 2);
    }

    #[test]
    fn test_mismatched_hash_runs_no_step() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path(), true);
        let (state, config) = fixture(&temp);
        let journal = Journal::new(temp.path().join("journal.log"));
        let fetcher = Fetcher::new(&LocalSource, &NoSignatures, temp.path().join("staging"));

        let err = install(&plan, &config, &fetcher, &journal).unwrap_err();

        assert!(matches!(err, HostkeepError::Integrity { .. }));
        assert_eq!(fs::read_dir(&state).unwrap().count(), 0);
    }

    #[test]
    fn test_verify_only_does_not_apply() {
        let temp = TempDir::new().unwrap();
        let plan = write_plan(temp.path(), false);
        let (state, config) = fixture(&temp);
        let journal = Journal::new(temp.path().join("journal.log"));
        let fetcher = Fetcher::new(&LocalSource, &NoSignatures, temp.path().join("staging"));

        let checks = verify(&plan, &config, &fetcher, &journal).unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| !c.passed));
        assert_eq!(fs::read_dir(&state).unwrap().count(), 0);
    }
}
