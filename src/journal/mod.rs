//! Run journal
//!
//! Every step, section, upload and restore outcome of a run is appended to
//! a line-delimited JSON journal. Fatal or not, no error goes unrecorded.
//!
//! ```rust,ignore
//! use hostkeep::journal::{Journal, Outcome, Scope};
//!
//! let journal = Journal::new(paths.journal_file());
//! journal.record(Scope::Section, "volume:db", Outcome::Failed, Some("detached"));
//! ```

mod entry;
mod logger;

pub use entry::{JournalEntry, Outcome, Scope};
pub use logger::{read_entries, Journal};
