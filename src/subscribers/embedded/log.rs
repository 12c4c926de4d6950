//! # LogWriter — structured `tracing` sink
//!
//! Renders every host [`Event`] as one `tracing` record with structured
//! fields, so the process-wide subscriber decides format and destination.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO servicevisor: control received service="demo" command="stop" code=1 state="running"
//! INFO servicevisor: status reported service="demo" state="stop_pending" checkpoint=1 wait_hint_ms=3000
//! INFO servicevisor: power event service="demo" code=4 event="Suspend"
//! WARN servicevisor: status submission failed service="demo" state="stopped" reason="handle closed"
//! ERROR servicevisor: workload failed service="demo" reason="start: port in use" exit_code=1
//! ```
//!
//! Interrogate resubmissions and quiet control events (interrogate, power and
//! session codes) are logged at `debug`; everything that changes
//! state or reports a failure is `info` or above.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "servicevisor";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn service(e: &Event) -> &str {
    e.service.as_deref().unwrap_or("-")
}

fn state(e: &Event) -> &'static str {
    e.state.map(|s| s.as_str()).unwrap_or("-")
}

fn reason(e: &Event) -> &str {
    e.reason.as_deref().unwrap_or("")
}

fn exit_code(e: &Event) -> u32 {
    e.exit_code.map(|c| c.service_specific()).unwrap_or(0)
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::ControlReceived if e.quiet => {
                tracing::debug!(target: TARGET, service = service(e), command = e.command.unwrap_or("-"),
                    code = e.code.unwrap_or(0), state = state(e), "control received");
            }
            EventKind::ControlReceived => {
                tracing::info!(target: TARGET, service = service(e), command = e.command.unwrap_or("-"),
                    code = e.code.unwrap_or(0), state = state(e), "control received");
            }
            EventKind::StopDeferred => {
                tracing::info!(target: TARGET, service = service(e), command = e.command.unwrap_or("-"),
                    "stop deferred until running");
            }
            EventKind::PowerEvent => {
                tracing::info!(target: TARGET, service = service(e), code = e.code.unwrap_or(0),
                    event = reason(e), "power event");
            }
            EventKind::SessionChange => {
                tracing::info!(target: TARGET, service = service(e), change = reason(e), "session change");
            }
            EventKind::TimeChange => {
                tracing::info!(target: TARGET, service = service(e), change = reason(e), "time change");
            }
            EventKind::StatusReported => {
                tracing::info!(target: TARGET, service = service(e), state = state(e),
                    checkpoint = e.checkpoint.unwrap_or(0), wait_hint_ms = e.wait_hint_ms.unwrap_or(0),
                    exit_code = exit_code(e), "status reported");
            }
            EventKind::StatusResubmitted => {
                tracing::debug!(target: TARGET, service = service(e), state = state(e),
                    checkpoint = e.checkpoint.unwrap_or(0), trigger = reason(e), "status resubmitted");
            }
            EventKind::StatusRejected => {
                tracing::debug!(target: TARGET, service = service(e), state = state(e),
                    reason = reason(e), "status report rejected");
            }
            EventKind::StatusSubmissionFailed => {
                tracing::warn!(target: TARGET, service = service(e), state = state(e),
                    reason = reason(e), "status submission failed");
            }
            EventKind::WorkloadStarting => {
                tracing::info!(target: TARGET, service = service(e), "workload starting");
            }
            EventKind::WorkloadRunning => {
                tracing::info!(target: TARGET, service = service(e), "workload running");
            }
            EventKind::WorkloadStopping => {
                tracing::info!(target: TARGET, service = service(e), trigger = reason(e), "workload stopping");
            }
            EventKind::WorkloadStopped => {
                tracing::info!(target: TARGET, service = service(e), exit_code = exit_code(e), "workload stopped");
            }
            EventKind::WorkloadFailed => {
                tracing::error!(target: TARGET, service = service(e), reason = reason(e),
                    exit_code = exit_code(e), "workload failed");
            }
            EventKind::RunAbandoned => {
                tracing::warn!(target: TARGET, service = service(e), reason = reason(e), "run abandoned after stop");
            }
            EventKind::StopIgnored => {
                tracing::debug!(target: TARGET, service = service(e), "stop already in progress");
            }
            EventKind::RegistrationFailed => {
                tracing::error!(target: TARGET, service = service(e), reason = reason(e), "registration failed");
            }
            EventKind::DispatcherExited => {
                tracing::info!(target: TARGET, service = service(e), "dispatcher exited");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(target: TARGET, service = service(e), reason = reason(e), "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: TARGET, subscriber = service(e), reason = reason(e), "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: TARGET, subscriber = service(e), info = reason(e), "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
