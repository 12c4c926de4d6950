//! # Status reporter: single owner of the service status record.
//!
//! [`StatusReporter`] is a cheap, cloneable handle. Every mutation is a message
//! to one [`StatusActor`] task, which owns the record, the checkpoint counter
//! and the authority's [`StatusHandle`]. Readers use a `watch` snapshot, so an
//! interrogate never sees a half-written record.
//!
//! ```text
//! dispatcher ─┐                                 ┌─► StatusHandle::submit()
//! runner ─────┼─► mpsc ─► StatusActor::apply() ─┼─► watch snapshot
//! heartbeat ──┘                                 └─► Bus (StatusReported / Rejected / ...)
//! ```
//!
//! ## Rules
//! - accepted controls: none while `StartPending`, the configured mask otherwise;
//! - checkpoint: `0` for `Running`/`Stopped`, previous pending checkpoint `+ 1` otherwise;
//! - `report` rejects regressions and a repeated non-pending state;
//! - `advance` silently skips states that are not strictly later;
//! - submission failures are published and swallowed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::authority::StatusHandle;
use crate::events::{Bus, Event, EventKind};
use crate::status::{ControlsAccepted, ServiceExitCode, ServiceState, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Report,
    Advance,
}

pub(crate) enum Message {
    Transition {
        state: ServiceState,
        wait_hint: Duration,
        exit_code: ServiceExitCode,
        mode: Mode,
    },
    Resubmit {
        trigger: &'static str,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the status actor.
#[derive(Clone)]
pub(crate) struct StatusReporter {
    tx: mpsc::UnboundedSender<Message>,
    snapshot: watch::Receiver<ServiceStatus>,
}

/// Receiving side handed to [`StatusActor::new`].
pub(crate) struct StatusInbox {
    rx: mpsc::UnboundedReceiver<Message>,
    snapshot: watch::Sender<ServiceStatus>,
}

impl StatusReporter {
    pub(crate) fn channel() -> (Self, StatusInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ServiceStatus::initial());
        (
            Self {
                tx,
                snapshot: snapshot_rx,
            },
            StatusInbox {
                rx,
                snapshot: snapshot_tx,
            },
        )
    }

    fn send(&self, msg: Message) {
        let _ = self.tx.send(msg);
    }

    /// Reports `state`; a repeated pending state is a heartbeat.
    pub(crate) fn report(&self, state: ServiceState, wait_hint: Duration) {
        self.send(Message::Transition {
            state,
            wait_hint,
            exit_code: ServiceExitCode::NO_ERROR,
            mode: Mode::Report,
        });
    }

    /// Reports `state` only if it is strictly later than the current state.
    pub(crate) fn advance(&self, state: ServiceState, wait_hint: Duration) {
        self.send(Message::Transition {
            state,
            wait_hint,
            exit_code: ServiceExitCode::NO_ERROR,
            mode: Mode::Advance,
        });
    }

    /// Terminal report.
    pub(crate) fn stopped(&self, exit_code: ServiceExitCode) {
        self.send(Message::Transition {
            state: ServiceState::Stopped,
            wait_hint: Duration::ZERO,
            exit_code,
            mode: Mode::Report,
        });
    }

    /// Re-submits the last record unchanged and returns it.
    pub(crate) fn interrogate(&self) -> ServiceStatus {
        self.send(Message::Resubmit {
            trigger: "interrogate",
        });
        self.snapshot()
    }

    /// Re-submits the last record unchanged.
    pub(crate) fn refresh(&self, trigger: &'static str) {
        self.send(Message::Resubmit { trigger });
    }

    pub(crate) fn snapshot(&self) -> ServiceStatus {
        *self.snapshot.borrow()
    }

    /// Waits until every earlier message was applied, then stops the actor.
    pub(crate) async fn close(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Close { done }).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Owner of the status record.
pub(crate) struct StatusActor {
    rx: mpsc::UnboundedReceiver<Message>,
    service: Arc<str>,
    status: ServiceStatus,
    counter: u32,
    reported: bool,
    accepted: ControlsAccepted,
    handle: Box<dyn StatusHandle>,
    snapshot: watch::Sender<ServiceStatus>,
    bus: Bus,
}

impl StatusActor {
    pub(crate) fn new(
        service: Arc<str>,
        accepted: ControlsAccepted,
        handle: Box<dyn StatusHandle>,
        inbox: StatusInbox,
        bus: Bus,
    ) -> Self {
        Self {
            rx: inbox.rx,
            service,
            status: ServiceStatus::initial(),
            counter: 0,
            reported: false,
            accepted,
            handle,
            snapshot: inbox.snapshot,
            bus,
        }
    }

    /// Spawnable message loop.
    pub(crate) async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            if let Message::Close { done } = msg {
                let _ = done.send(());
                break;
            }
            self.apply(msg);
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(Arc::clone(&self.service))
    }

    fn apply(&mut self, msg: Message) {
        match msg {
            Message::Transition {
                state,
                wait_hint,
                exit_code,
                mode,
            } => self.transition(state, wait_hint, exit_code, mode),
            Message::Resubmit { trigger } => self.resubmit(trigger),
            Message::Close { done } => {
                let _ = done.send(());
            }
        }
    }

    fn transition(
        &mut self,
        state: ServiceState,
        wait_hint: Duration,
        exit_code: ServiceExitCode,
        mode: Mode,
    ) {
        if self.reported {
            let current = self.status.state;
            if mode == Mode::Advance && state <= current {
                return;
            }
            let rejection = if state < current {
                Some("regression")
            } else if state == current && !state.is_pending() {
                Some("duplicate")
            } else {
                None
            };
            if let Some(reason) = rejection {
                self.bus.publish(
                    self.event(EventKind::StatusRejected)
                        .with_state(state)
                        .with_reason(format!("{reason}: current state is {current}")),
                );
                return;
            }
        }

        let checkpoint = if state.is_pending() {
            self.counter = self.counter.saturating_add(1);
            self.counter
        } else {
            self.counter = 0;
            0
        };
        let accepted = if state == ServiceState::StartPending {
            ControlsAccepted::NONE
        } else {
            self.accepted
        };

        self.status = ServiceStatus {
            state,
            accepted,
            checkpoint,
            wait_hint: if state.is_pending() { wait_hint } else { Duration::ZERO },
            exit_code,
        };
        self.reported = true;
        self.snapshot.send_replace(self.status);

        if self.submit() {
            self.bus
                .publish(self.event(EventKind::StatusReported).with_status(&self.status));
        }
    }

    fn resubmit(&mut self, trigger: &'static str) {
        if !self.reported {
            return;
        }
        if self.submit() {
            self.bus.publish(
                self.event(EventKind::StatusResubmitted)
                    .with_status(&self.status)
                    .with_reason(trigger),
            );
        }
    }

    fn submit(&self) -> bool {
        match self.handle.submit(&self.status) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(service = %self.service, state = %self.status.state,
                    error = %e, "status submission failed");
                self.bus.publish(
                    self.event(EventKind::StatusSubmissionFailed)
                        .with_state(self.status.state)
                        .with_reason(e.as_message()),
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{ControlAuthority, ControlReply, MemoryAuthority};

    fn actor(accepted: ControlsAccepted) -> (StatusActor, StatusReporter, MemoryAuthority, Bus) {
        let authority = MemoryAuthority::new();
        let handle = authority
            .register_handler(
                "demo",
                Arc::new(|_: crate::control::ControlCommand| {
                    ControlReply::ok(ServiceStatus::initial())
                }),
            )
            .unwrap();
        let bus = Bus::new(64);
        let (reporter, inbox) = StatusReporter::channel();
        let actor = StatusActor::new(Arc::from("demo"), accepted, handle, inbox, bus.clone());
        (actor, reporter, authority, bus)
    }

    fn report(state: ServiceState, hint_ms: u64) -> Message {
        Message::Transition {
            state,
            wait_hint: Duration::from_millis(hint_ms),
            exit_code: ServiceExitCode::NO_ERROR,
            mode: Mode::Report,
        }
    }

    fn summary(authority: &MemoryAuthority) -> Vec<(ServiceState, u32)> {
        authority
            .history()
            .iter()
            .map(|s| (s.state, s.checkpoint))
            .collect()
    }

    #[test]
    fn test_checkpoints_reset_at_running_and_stopped() {
        let (mut actor, _reporter, authority, _bus) = actor(ControlsAccepted::default());

        actor.apply(report(ServiceState::StartPending, 3000));
        actor.apply(report(ServiceState::StartPending, 3000));
        actor.apply(report(ServiceState::Running, 0));
        actor.apply(report(ServiceState::StopPending, 3000));
        actor.apply(report(ServiceState::Stopped, 0));

        assert_eq!(
            summary(&authority),
            vec![
                (ServiceState::StartPending, 1),
                (ServiceState::StartPending, 2),
                (ServiceState::Running, 0),
                (ServiceState::StopPending, 1),
                (ServiceState::Stopped, 0),
            ]
        );
    }

    #[test]
    fn test_accepted_controls_empty_only_while_start_pending() {
        let (mut actor, reporter, authority, _bus) = actor(ControlsAccepted::extended());

        actor.apply(report(ServiceState::StartPending, 3000));
        assert!(reporter.snapshot().accepted.is_empty());
        actor.apply(report(ServiceState::Running, 0));
        actor.apply(report(ServiceState::StopPending, 3000));

        let history = authority.history();
        assert!(history[0].accepted.is_empty());
        assert_eq!(history[1].accepted, ControlsAccepted::extended());
        assert_eq!(history[2].accepted, ControlsAccepted::extended());
        assert_eq!(history[1].wait_hint, Duration::ZERO);
    }

    #[test]
    fn test_regression_and_duplicate_terminal_are_rejected() {
        let (mut actor, _reporter, authority, bus) = actor(ControlsAccepted::default());
        let mut rx = bus.subscribe();

        actor.apply(report(ServiceState::StartPending, 3000));
        actor.apply(report(ServiceState::Running, 0));
        actor.apply(report(ServiceState::StartPending, 3000));
        actor.apply(report(ServiceState::Running, 0));

        assert_eq!(authority.history().len(), 2);
        let mut rejected = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::StatusRejected {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 2);
    }

    #[test]
    fn test_advance_skips_states_not_later() {
        let (mut actor, reporter, authority, _bus) = actor(ControlsAccepted::default());

        actor.apply(report(ServiceState::Running, 0));
        actor.apply(Message::Transition {
            state: ServiceState::Running,
            wait_hint: Duration::ZERO,
            exit_code: ServiceExitCode::NO_ERROR,
            mode: Mode::Advance,
        });
        actor.apply(Message::Transition {
            state: ServiceState::StopPending,
            wait_hint: Duration::from_secs(3),
            exit_code: ServiceExitCode::NO_ERROR,
            mode: Mode::Advance,
        });

        assert_eq!(authority.history().len(), 2);
        assert_eq!(reporter.snapshot().state, ServiceState::StopPending);
    }

    #[test]
    fn test_resubmit_keeps_record_identical() {
        let (mut actor, _reporter, authority, _bus) = actor(ControlsAccepted::default());

        actor.apply(Message::Resubmit {
            trigger: "interrogate",
        });
        assert!(authority.history().is_empty());

        actor.apply(report(ServiceState::Running, 0));
        actor.apply(Message::Resubmit {
            trigger: "interrogate",
        });

        let history = authority.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], history[1]);
    }

    #[test]
    fn test_submission_failure_is_swallowed() {
        let (mut actor, reporter, authority, bus) = actor(ControlsAccepted::default());
        let mut rx = bus.subscribe();
        authority.set_reject_submissions(true);

        actor.apply(report(ServiceState::StartPending, 3000));

        assert!(authority.history().is_empty());
        assert_eq!(reporter.snapshot().checkpoint, 1);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::StatusSubmissionFailed);
    }

    #[tokio::test]
    async fn test_close_flushes_pending_messages() {
        let (actor, reporter, authority, _bus) = actor(ControlsAccepted::default());
        let task = tokio::spawn(actor.run());

        reporter.report(ServiceState::StartPending, Duration::from_secs(3));
        reporter.advance(ServiceState::Running, Duration::ZERO);
        reporter.close().await;
        task.await.unwrap();

        assert_eq!(authority.history().len(), 2);
        assert_eq!(reporter.snapshot().state, ServiceState::Running);
    }
}
