//! Append-only run journal
//!
//! Each entry is written as a single JSON line and flushed immediately, so
//! the journal survives an interrupt at any point of a run. Its path is what
//! gets reported when a step aborts a run.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::{HostkeepError, HostkeepResult};

use super::entry::{JournalEntry, Outcome, Scope};

/// Writes journal entries for one run
#[derive(Debug, Clone)]
pub struct Journal {
    log_path: PathBuf,
    run_id: Uuid,
}

impl Journal {
    /// Start a journal for a new run writing to `log_path`
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            log_path,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append an entry
    pub fn log(&self, entry: &JournalEntry) -> HostkeepResult<()> {
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| HostkeepError::Io(format!("Failed to open journal: {}", e)))?;

        let json = serde_json::to_string(entry)
            .map_err(|e| HostkeepError::Json(format!("Failed to serialize journal entry: {}", e)))?;

        writeln!(file, "{}", json)
            .and_then(|_| file.flush())
            .map_err(|e| HostkeepError::Io(format!("Failed to write journal entry: {}", e)))?;

        Ok(())
    }

    /// Record an event; journal write failures are reported but never
    /// interrupt the run they describe
    pub fn record(&self, scope: Scope, subject: &str, outcome: Outcome, message: Option<&str>) {
        let mut entry = JournalEntry::new(self.run_id, scope, subject, outcome);
        if let Some(message) = message {
            entry = entry.with_message(message);
        }
        if let Err(e) = self.log(&entry) {
            warn!(error = %e, journal = %self.log_path.display(), "could not write journal entry");
        }
    }

    /// Read every entry in the journal file, oldest first
    pub fn read_all(&self) -> HostkeepResult<Vec<JournalEntry>> {
        read_entries(&self.log_path)
    }

    /// Entries written by this run only
    pub fn read_run(&self) -> HostkeepResult<Vec<JournalEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.run_id == self.run_id)
            .collect())
    }
}

/// Read all entries from a journal file
pub fn read_entries(path: &Path) -> HostkeepResult<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)
        .map_err(|e| HostkeepError::Io(format!("Failed to open journal: {}", e)))?;

    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            HostkeepError::Io(format!("Failed to read journal line {}: {}", line_num + 1, e))
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let entry: JournalEntry = serde_json::from_str(&line).map_err(|e| {
            HostkeepError::Json(format!(
                "Failed to parse journal entry at line {}: {}",
                line_num + 1,
                e
            ))
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_read() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::new(temp.path().join("journal.log"));

        journal.record(Scope::Step, "docker", Outcome::Ok, None);
        journal.record(Scope::Step, "ssh", Outcome::Failed, Some("exit 1"));

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].subject, "ssh");
        assert_eq!(entries[1].outcome, Outcome::Failed);
        assert_eq!(entries[1].message.as_deref(), Some("exit 1"));
    }

    #[test]
    fn test_runs_are_separated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("journal.log");

        let first = Journal::new(path.clone());
        first.record(Scope::Run, "install", Outcome::Started, None);
        let second = Journal::new(path);
        second.record(Scope::Run, "backup", Outcome::Started, None);

        assert_eq!(second.read_all().unwrap().len(), 2);
        let own = second.read_run().unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].subject, "backup");
    }

    #[test]
    fn test_empty_journal() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::new(temp.path().join("journal.log"));
        assert!(journal.read_all().unwrap().is_empty());
    }
}
