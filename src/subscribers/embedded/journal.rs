//! # StatusJournal – ordered record of status submissions
//!
//! Keeps every [`EventKind::StatusReported`] and [`EventKind::StatusResubmitted`]
//! event as a [`JournalEntry`], in bus order. Useful for diagnostics endpoints
//! and for asserting the report sequence in tests.
//!
//! ```text
//! on_event(ev):
//!   ├─ StatusReported    → push { state, checkpoint, wait_hint_ms, resubmitted: false }
//!   ├─ StatusResubmitted → push { ..., resubmitted: true }
//!   └─ otherwise         → ignore
//! ```

use std::sync::RwLock;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::status::{ServiceExitCode, ServiceState};
use crate::subscribers::Subscribe;

/// One submitted status record as seen on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub seq: u64,
    pub state: ServiceState,
    pub checkpoint: u32,
    pub wait_hint_ms: u32,
    pub exit_code: ServiceExitCode,
    /// True when the record was re-sent unchanged.
    pub resubmitted: bool,
}

/// Ordered journal of status submissions.
#[derive(Default)]
pub struct StatusJournal {
    entries: RwLock<Vec<JournalEntry>>,
}

impl StatusJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the journal, ordered by event sequence.
    pub fn entries(&self) -> Vec<JournalEntry> {
        match self.entries.read() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `(state, checkpoint)` pairs of the new (not resubmitted) reports.
    pub fn transitions(&self) -> Vec<(ServiceState, u32)> {
        self.entries()
            .into_iter()
            .filter(|e| !e.resubmitted)
            .map(|e| (e.state, e.checkpoint))
            .collect()
    }
}

#[async_trait]
impl Subscribe for StatusJournal {
    async fn on_event(&self, ev: &Event) {
        let resubmitted = match ev.kind {
            EventKind::StatusReported => false,
            EventKind::StatusResubmitted => true,
            _ => return,
        };
        let Some(state) = ev.state else { return };

        let entry = JournalEntry {
            seq: ev.seq,
            state,
            checkpoint: ev.checkpoint.unwrap_or(0),
            wait_hint_ms: ev.wait_hint_ms.unwrap_or(0),
            exit_code: ev.exit_code.unwrap_or_default(),
            resubmitted,
        };
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let at = entries.partition_point(|e| e.seq < entry.seq);
        entries.insert(at, entry);
    }

    fn name(&self) -> &'static str {
        "StatusJournal"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ServiceStatus;

    #[tokio::test]
    async fn test_records_reports_in_sequence_order() {
        let journal = StatusJournal::new();
        let mut running = ServiceStatus::initial();
        running.state = ServiceState::Running;
        let mut pending = ServiceStatus::initial();
        pending.checkpoint = 1;

        let first = Event::new(EventKind::StatusReported).with_status(&pending);
        let second = Event::new(EventKind::StatusReported).with_status(&running);
        let third = Event::new(EventKind::StatusResubmitted).with_status(&running);

        journal.on_event(&second).await;
        journal.on_event(&first).await;
        journal.on_event(&third).await;
        journal.on_event(&Event::new(EventKind::WorkloadRunning)).await;

        assert_eq!(
            journal.transitions(),
            vec![(ServiceState::StartPending, 1), (ServiceState::Running, 0)]
        );
        let entries = journal.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[2].resubmitted);
    }
}
