//! Orchestration and configuration output

use crate::config::{ConfigSnapshot, HostkeepPaths};
use crate::orchestrator::{CheckResult, RunReport, StepOutcome};

use super::format::heading;

pub fn format_run_report(report: &RunReport) -> String {
    let mut output = heading("Installation");

    let id_width = report
        .steps
        .iter()
        .map(|s| s.id.len())
        .max()
        .unwrap_or(4)
        .max(4);

    for step in &report.steps {
        let detail = match &step.outcome {
            StepOutcome::Failed { reason } => format!("{} ({})", step.outcome.label(), reason),
            other => other.label().to_string(),
        };
        output.push_str(&format!(
            "  {:<id_width$}  {}\n",
            step.id,
            detail,
            id_width = id_width
        ));
    }

    output.push('\n');
    output.push_str(&format_checks(&report.verification));
    output.push_str(&format!("\nJournal: {}\n", report.journal.display()));
    output
}

pub fn format_checks(checks: &[CheckResult]) -> String {
    if checks.is_empty() {
        return "Verification: nothing to verify\n".to_string();
    }
    let passed = checks.iter().filter(|c| c.passed).count();
    let mut output = format!("Verification: {}/{} passed\n", passed, checks.len());
    for check in checks.iter().filter(|c| !c.passed) {
        output.push_str(&format!(
            "  FAIL {}: {}\n",
            check.id,
            check.message.as_deref().unwrap_or("check failed")
        ));
    }
    output
}

/// Resolved configuration with the origin of every value
pub fn format_config(paths: &HostkeepPaths, snapshot: &ConfigSnapshot) -> String {
    let mut output = heading("hostkeep Configuration");
    output.push_str(&format!("Base directory:   {}\n", paths.base_dir().display()));
    output.push_str(&format!("Backup directory: {}\n", paths.backup_dir().display()));
    output.push_str(&format!("Journal:          {}\n", paths.journal_file().display()));
    output.push('\n');

    if snapshot.is_empty() {
        output.push_str("No values resolved.\n");
        return output;
    }

    let key_width = snapshot.iter().map(|(k, _)| k.len()).max().unwrap_or(3);
    for (key, value) in snapshot.iter() {
        let source = snapshot
            .source(key)
            .map(|s| s.to_string())
            .unwrap_or_default();
        output.push_str(&format!(
            "  {:<key_width$} = {}  ({})\n",
            key,
            value,
            source,
            key_width = key_width
        ));
    }
    output
}
