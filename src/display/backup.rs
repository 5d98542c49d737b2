//! Backup, restore and retention output

use chrono::Utc;

use crate::backup::{
    ArchiveInfo, BackupReport, PruneReport, RestoreSummary, UploadLedger, UploadOutcome,
    UploadResult,
};

use super::format::{format_age, format_elapsed, format_size, heading};

/// Format archives as a table, newest first
pub fn format_archive_list(archives: &[ArchiveInfo], ledger: &UploadLedger) -> String {
    if archives.is_empty() {
        return "No backups found.\nCreate one with: hostkeep backup".to_string();
    }

    let name_width = archives
        .iter()
        .map(|a| a.filename.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:>6}  {:>10}  {:<23}  {}\n",
        "Archive",
        "Age",
        "Size",
        "Status",
        "Uploaded",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:-<name_width$}  {:->6}  {:->10}  {:-<23}  {:-<8}\n",
        "",
        "",
        "",
        "",
        "",
        name_width = name_width,
    ));

    let now = Utc::now();
    for archive in archives {
        let status = archive.status.map(|s| s.label()).unwrap_or("unreadable");
        let uploaded = if ledger.is_uploaded(&archive.filename) {
            "yes"
        } else {
            "no"
        };
        output.push_str(&format!(
            "{:<name_width$}  {:>6}  {:>10}  {:<23}  {}\n",
            archive.filename,
            format_age(now.signed_duration_since(archive.created_at)),
            format_size(archive.size_bytes),
            status,
            uploaded,
            name_width = name_width,
        ));
    }

    output.push_str(&format!("\nTotal: {} backup(s)\n", archives.len()));
    output
}

pub fn format_backup_report(report: &BackupReport) -> String {
    let mut output = heading("Backup");
    output.push_str(&format!("Archive:  {}\n", report.archive.display()));
    output.push_str(&format!(
        "Size:     {} ({} captured)\n",
        format_size(report.archive_bytes),
        format_size(report.manifest.total_bytes())
    ));
    output.push_str(&format!("Status:   {}\n", report.status().label()));
    output.push_str(&format!("Duration: {}\n\n", format_elapsed(report.duration)));

    for section in &report.manifest.sections {
        let detail = match &section.message {
            Some(message) => message.clone(),
            None => format_size(section.size_bytes),
        };
        output.push_str(&format!(
            "  [{:<6}] {}  {}\n",
            section.status.to_string(),
            section.id(),
            detail
        ));
    }
    output
}

pub fn format_restore_summary(summary: &RestoreSummary) -> String {
    let mut output = heading(&format!("Restore of {}", summary.archive));

    if let Some(validation) = &summary.validation {
        output.push_str(&format!("{}\n", validation.summary()));
    }
    if summary.dry_run {
        output.push_str("Dry run: archive is valid, nothing was changed.\n");
        return output;
    }
    if summary.cancelled {
        output.push_str("Restore cancelled, nothing was changed.\n");
        return output;
    }

    output.push_str(&format!(
        "\nRestored: {}  Skipped: {}  Failed: {}\n",
        summary.restored.len(),
        summary.skipped.len(),
        summary.failed.len()
    ));
    for id in &summary.restored {
        output.push_str(&format!("  restored  {}\n", id));
    }
    for id in &summary.skipped {
        output.push_str(&format!("  skipped   {}\n", id));
    }
    for (id, reason) in &summary.failed {
        output.push_str(&format!("  failed    {}: {}\n", id, reason));
    }
    if !summary.restarted.is_empty() {
        output.push_str(&format!("\nRestarted: {}\n", summary.restarted.join(", ")));
    }
    output
}

pub fn format_prune_report(report: &PruneReport, retention_days: u32) -> String {
    let mut output = String::new();
    if report.deleted.is_empty() {
        output.push_str("No backups to prune.\n");
    } else {
        output.push_str(&format!("Deleted {} backup(s):\n", report.deleted.len()));
        for path in &report.deleted {
            output.push_str(&format!("  {}\n", path.display()));
        }
    }
    output.push_str(&format!(
        "Retention window: {} day(s); {} kept\n",
        retention_days, report.kept
    ));
    if let Some(protected) = &report.protected {
        output.push_str(&format!("Most recent successful: {}\n", protected.display()));
    }
    output
}

pub fn format_upload_results(results: &[UploadResult]) -> String {
    if results.is_empty() {
        return "Nothing to upload.\n".to_string();
    }
    let mut output = String::new();
    for result in results {
        let line = match &result.outcome {
            UploadOutcome::Uploaded { attempts } if *attempts > 1 => {
                format!("uploaded ({} attempts)", attempts)
            }
            UploadOutcome::Uploaded { .. } => "uploaded".to_string(),
            UploadOutcome::AlreadyUploaded => "already uploaded".to_string(),
            UploadOutcome::Skipped => "skipped (no remote configured)".to_string(),
            UploadOutcome::Failed { attempts, reason } => {
                format!("FAILED after {} attempt(s): {}", attempts, reason)
            }
        };
        output.push_str(&format!("  {}  {}\n", result.archive, line));
    }
    output
}
