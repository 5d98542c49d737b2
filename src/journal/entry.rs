//! Journal entry data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What part of a run an entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Run,
    Fetch,
    Step,
    Verify,
    Section,
    Upload,
    Restore,
    Retention,
}

/// How the attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Started,
    Ok,
    Skipped,
    Warn,
    Failed,
}

/// One line of the run journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    pub scope: Scope,
    /// Step id, section id, archive name...
    pub subject: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JournalEntry {
    pub fn new(run_id: Uuid, scope: Scope, subject: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            scope,
            subject: subject.into(),
            outcome,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
