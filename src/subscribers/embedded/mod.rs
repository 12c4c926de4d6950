//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events as structured `tracing` records.
//! - [`StatusJournal`]: ordered record of status submissions.

mod journal;
mod log;

pub use journal::{JournalEntry, StatusJournal};
pub use log::LogWriter;
