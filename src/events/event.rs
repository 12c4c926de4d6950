//! # Runtime events emitted by the dispatcher, status reporter and lifecycle runner.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Control events**: codes received from the authority and decoded notifications
//! - **Status events**: records submitted to, or rejected before, the authority
//! - **Workload events**: phases of the hosted workload
//! - **Host events**: dispatcher exit, registration failure, subscriber health
//!
//! The [`Event`] struct carries metadata such as timestamps, service name,
//! command, state and checkpoint.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use servicevisor::{ControlCommand, Event, EventKind, ServiceState};
//!
//! let ev = Event::new(EventKind::ControlReceived)
//!     .with_service("demo")
//!     .with_command(&ControlCommand::Stop)
//!     .with_state(ServiceState::Running);
//!
//! assert_eq!(ev.kind, EventKind::ControlReceived);
//! assert_eq!(ev.command.as_deref(), Some("stop"));
//! assert_eq!(ev.code, Some(1));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::control::ControlCommand;
use crate::status::{ServiceExitCode, ServiceState, ServiceStatus};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Control events ===
    /// A control code arrived on the authority thread.
    ///
    /// Sets: `service`, `command`, `code`, `state` (state when it arrived),
    /// `quiet` for interrogate, power and session codes unless
    /// `HostConfig::log_noisy_controls` is set.
    ControlReceived,

    /// Stop or shutdown arrived while still starting; queued until `Running`.
    ///
    /// Sets: `service`, `command`.
    StopDeferred,

    /// Decoded power broadcast.
    ///
    /// Sets: `service`, `code` (`PBT_*` value), `reason` (decoded name).
    PowerEvent,

    /// Decoded session change.
    ///
    /// Sets: `service`, `reason` (reason and session id).
    SessionChange,

    /// Decoded system time change.
    ///
    /// Sets: `service`, `reason` (old and new time).
    TimeChange,

    // === Status events ===
    /// A new status record was submitted.
    ///
    /// Sets: `service`, `state`, `checkpoint`, `wait_hint_ms`, `exit_code`.
    StatusReported,

    /// The last record was submitted again unchanged (interrogate, unknown code).
    ///
    /// Sets: `service`, `state`, `checkpoint`, `reason` (trigger).
    StatusResubmitted,

    /// A report was refused because it would regress the lifecycle or duplicate
    /// the terminal status.
    ///
    /// Sets: `service`, `state` (requested), `reason`.
    StatusRejected,

    /// The authority rejected the submission; swallowed after this event.
    ///
    /// Sets: `service`, `state`, `reason`.
    StatusSubmissionFailed,

    // === Workload events ===
    /// `Workload::start` is about to be called.
    WorkloadStarting,

    /// `Workload::run` is about to be called.
    WorkloadRunning,

    /// Stop sequence began.
    ///
    /// Sets: `service`, `reason` (`run_returned` or the control name).
    WorkloadStopping,

    /// Stop sequence finished and `Stopped` was reported.
    ///
    /// Sets: `service`, `exit_code`.
    WorkloadStopped,

    /// A workload phase failed or panicked.
    ///
    /// Sets: `service`, `reason`, `exit_code`.
    WorkloadFailed,

    /// `stop()` finished but `run()` ignored cancellation past the stop wait
    /// hint; the run future is dropped and `Stopped` is reported anyway.
    ///
    /// Sets: `service`, `reason`.
    RunAbandoned,

    /// A stop request arrived after the stop sequence was already claimed.
    StopIgnored,

    // === Host events ===
    /// The authority refused the dispatcher registration.
    ///
    /// Sets: `service`, `reason`.
    RegistrationFailed,

    /// The dispatcher call returned; the process is winding down.
    DispatcherExited,

    /// The lifecycle worker did not finish within `HostConfig::grace`.
    GraceExceeded,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `reason`.
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Service name (or subscriber name for subscriber events).
    pub service: Option<Arc<str>>,
    /// Control command name.
    pub command: Option<&'static str>,
    /// Raw control code or notification type.
    pub code: Option<u32>,
    /// Lifecycle state.
    pub state: Option<ServiceState>,
    /// Checkpoint of the submitted record.
    pub checkpoint: Option<u32>,
    /// Wait hint of the submitted record (ms).
    pub wait_hint_ms: Option<u32>,
    /// Exit code of the submitted record or failed phase.
    pub exit_code: Option<ServiceExitCode>,
    /// Human-readable reason (errors, decoded payloads, triggers).
    pub reason: Option<Arc<str>>,
    /// Routine event; log sinks render it at `debug`.
    pub quiet: bool,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            command: None,
            code: None,
            state: None,
            checkpoint: None,
            wait_hint_ms: None,
            exit_code: None,
            reason: None,
            quiet: false,
        }
    }

    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches the command name and raw code.
    #[inline]
    pub fn with_command(mut self, command: &ControlCommand) -> Self {
        self.command = Some(command.name());
        self.code = Some(command.code());
        self
    }

    #[inline]
    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    #[inline]
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = Some(state);
        self
    }

    /// Copies state, checkpoint, wait hint and exit code from a status record.
    #[inline]
    pub fn with_status(mut self, status: &ServiceStatus) -> Self {
        self.state = Some(status.state);
        self.checkpoint = Some(status.checkpoint);
        self.wait_hint_ms = Some(status.wait_hint_ms());
        self.exit_code = Some(status.exit_code);
        self
    }

    #[inline]
    pub fn with_exit_code(mut self, exit_code: ServiceExitCode) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    #[inline]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::DispatcherExited);
        let b = Event::new(EventKind::DispatcherExited);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_with_status_copies_record_fields() {
        let mut status = ServiceStatus::initial();
        status.checkpoint = 3;
        status.wait_hint = Duration::from_millis(3000);

        let ev = Event::new(EventKind::StatusReported).with_status(&status);
        assert_eq!(ev.state, Some(ServiceState::StartPending));
        assert_eq!(ev.checkpoint, Some(3));
        assert_eq!(ev.wait_hint_ms, Some(3000));
        assert_eq!(ev.exit_code, Some(ServiceExitCode::NO_ERROR));
    }

    #[test]
    fn test_subscriber_events() {
        let ev = Event::subscriber_overflow("journal", "full");
        assert!(ev.is_subscriber_event());
        assert_eq!(ev.service.as_deref(), Some("journal"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=journal reason=full"));
    }
}
