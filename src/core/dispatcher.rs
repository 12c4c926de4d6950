//! # Control dispatcher.
//!
//! Runs on the authority's thread and must return within milliseconds, so it
//! only reads the status snapshot and sends on unbounded channels.
//!
//! ```text
//! handle(command):
//!   ├─ Interrogate        → resubmit last record, reply with it
//!   ├─ Stop / Shutdown    → StartPending? publish StopDeferred
//!   │                       otherwise     advance(StopPending, stop_wait_hint)
//!   │                       then          stop request ─► lifecycle runner
//!   ├─ PowerEvent         ┐
//!   ├─ SessionChange      ├─ publish decoded event, no status change
//!   ├─ TimeChange         ┘
//!   └─ Other(code)        → resubmit last record unchanged
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::authority::ControlReply;
use crate::control::ControlCommand;
use crate::events::{Bus, Event, EventKind};
use crate::status::ServiceState;

use super::reporter::StatusReporter;

/// Request for the lifecycle runner to begin the stop sequence.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StopRequest {
    /// Name of the control that asked for the stop.
    pub(crate) trigger: &'static str,
}

pub(crate) struct ControlDispatcher {
    service: Arc<str>,
    reporter: StatusReporter,
    stop_tx: mpsc::UnboundedSender<StopRequest>,
    bus: Bus,
    stop_wait_hint: Duration,
    log_noisy_controls: bool,
}

impl ControlDispatcher {
    pub(crate) fn new(
        service: Arc<str>,
        reporter: StatusReporter,
        stop_tx: mpsc::UnboundedSender<StopRequest>,
        bus: Bus,
        stop_wait_hint: Duration,
        log_noisy_controls: bool,
    ) -> Self {
        Self {
            service,
            reporter,
            stop_tx,
            bus,
            stop_wait_hint,
            log_noisy_controls,
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(Arc::clone(&self.service))
    }

    /// Handles one control command. Never blocks.
    pub(crate) fn handle(&self, command: ControlCommand) -> ControlReply {
        let current = self.reporter.snapshot();
        self.bus.publish(
            self.event(EventKind::ControlReceived)
                .with_command(&command)
                .with_state(current.state)
                .with_quiet(command.is_noisy() && !self.log_noisy_controls),
        );

        match command {
            ControlCommand::Interrogate => ControlReply::ok(self.reporter.interrogate()),
            ControlCommand::Stop | ControlCommand::Shutdown => {
                if current.state == ServiceState::StartPending {
                    self.bus
                        .publish(self.event(EventKind::StopDeferred).with_command(&command));
                } else {
                    self.reporter
                        .advance(ServiceState::StopPending, self.stop_wait_hint);
                }
                let _ = self.stop_tx.send(StopRequest {
                    trigger: command.name(),
                });
                ControlReply::ok(current)
            }
            ControlCommand::PowerEvent(ev) => {
                self.bus.publish(
                    self.event(EventKind::PowerEvent)
                        .with_code(ev.to_raw())
                        .with_reason(format!("{ev:?}")),
                );
                ControlReply::ok(current)
            }
            ControlCommand::SessionChange { reason, session_id } => {
                self.bus.publish(
                    self.event(EventKind::SessionChange)
                        .with_command(&command)
                        .with_reason(format!("{reason:?} session={session_id}")),
                );
                ControlReply::ok(current)
            }
            ControlCommand::TimeChange { old, new } => {
                self.bus.publish(
                    self.event(EventKind::TimeChange)
                        .with_command(&command)
                        .with_reason(format!(
                            "old={}s new={}s",
                            unix_seconds(old),
                            unix_seconds(new)
                        )),
                );
                ControlReply::ok(current)
            }
            ControlCommand::Other(_) => {
                self.reporter.refresh("unknown_control");
                ControlReply::ok(current)
            }
        }
    }
}

fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
