//! # Lifecycle runner: drives the workload through start, run and stop.
//!
//! One runner task per activation. It owns the stop-request receiver and is the
//! only place where workload phases are called.
//!
//! ```text
//! WorkloadStarting
//!   start()  (heartbeat StartPending every wait_hint/2)
//!     ├─ Err/panic ─► claim latch ─► WorkloadFailed ─► Stopped(exit≠0)
//!     └─ Ok ──────► advance(Running) ─► WorkloadRunning
//! select (biased):
//!   ├─ stop request ─► cancel ctx
//!   │                   ├─ spawn stop worker: StopPending, stop()
//!   │                   └─ drain run(), at most stop_wait_hint past stop()
//!   │                      (else RunAbandoned, run future dropped)
//!   └─ run() returned ─► stop sequence inline: StopPending, stop()
//! Stopped(exit) ─► WorkloadStopped
//! ```
//!
//! ## Rules
//! - `stop()` is called at most once, guarded by [`StopLatch`];
//! - `Stopped` is reported exactly once per activation, even if `run()`
//!   ignores cancellation;
//! - every phase runs under `catch_unwind`; a panic maps to exit code 4;
//! - `run()` returning [`WorkloadError::Canceled`] is a graceful exit.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, WorkloadError};
use crate::events::{Bus, Event, EventKind};
use crate::status::{ServiceExitCode, ServiceState};
use crate::subscribers::panic_message;
use crate::workload::WorkloadRef;

use super::dispatcher::StopRequest;
use super::reporter::StatusReporter;

/// Once-latch for the stop sequence.
#[derive(Debug, Default)]
pub(crate) struct StopLatch {
    claimed: AtomicBool,
}

impl StopLatch {
    /// Returns `true` for the first caller only.
    pub(crate) fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }
}

/// Phase timing taken from the host configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub(crate) start_wait_hint: Duration,
    pub(crate) stop_wait_hint: Duration,
    pub(crate) start_heartbeat: Option<Duration>,
    pub(crate) stop_heartbeat: Option<Duration>,
}

/// Shared pieces both the runner and the stop worker need.
#[derive(Clone)]
struct Phases {
    service: Arc<str>,
    workload: WorkloadRef,
    reporter: StatusReporter,
    bus: Bus,
    timing: Timing,
    latch: Arc<StopLatch>,
}

impl Phases {
    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_service(Arc::clone(&self.service))
    }

    /// Re-reports `state` every `period` until `fut` completes.
    async fn with_heartbeat<F: Future>(
        &self,
        state: ServiceState,
        wait_hint: Duration,
        period: Option<Duration>,
        fut: F,
    ) -> F::Output {
        let Some(period) = period else {
            return fut.await;
        };
        tokio::pin!(fut);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                out = &mut fut => return out,
                _ = ticker.tick() => self.reporter.report(state, wait_hint),
            }
        }
    }

    /// Runs a `start`/`stop` phase with heartbeat and panic isolation.
    async fn guarded<F>(
        &self,
        phase: &'static str,
        state: ServiceState,
        wait_hint: Duration,
        period: Option<Duration>,
        fut: F,
    ) -> Result<(), ServiceError>
    where
        F: Future<Output = Result<(), WorkloadError>>,
    {
        let caught = AssertUnwindSafe(fut).catch_unwind();
        match self.with_heartbeat(state, wait_hint, period, caught).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(phase_error(phase, e)),
            Err(panic) => Err(ServiceError::WorkloadPanicked {
                phase,
                info: panic_message(panic.as_ref()),
            }),
        }
    }

    /// StopPending, `stop()`. Does not report `Stopped`.
    async fn stop_sequence(self, trigger: &'static str) -> Result<(), ServiceError> {
        if !self.latch.claim() {
            self.bus.publish(self.event(EventKind::StopIgnored));
            return Ok(());
        }
        let hint = self.timing.stop_wait_hint;
        self.reporter.advance(ServiceState::StopPending, hint);
        self.bus
            .publish(self.event(EventKind::WorkloadStopping).with_reason(trigger));

        self.guarded(
            "stop",
            ServiceState::StopPending,
            hint,
            self.timing.stop_heartbeat,
            self.workload.stop(),
        )
        .await
    }

    /// Gives `run()` one stop wait hint to honor cancellation once `stop()`
    /// has finished, then drops it.
    async fn drain<F>(&self, run: F) -> Result<(), ServiceError>
    where
        F: Future<Output = Result<Result<(), WorkloadError>, Box<dyn Any + Send>>>,
    {
        let hint = self.timing.stop_wait_hint;
        match tokio::time::timeout(hint, run).await {
            Ok(out) => run_outcome(out),
            Err(_) => {
                tracing::warn!(service = %self.service, ?hint, "run ignored cancellation");
                self.bus.publish(
                    self.event(EventKind::RunAbandoned)
                        .with_reason(format!("run still active {hint:?} after stop")),
                );
                Ok(())
            }
        }
    }

    fn failed(&self, err: &ServiceError) {
        tracing::error!(service = %self.service, error = %err, "workload failed");
        self.bus.publish(
            self.event(EventKind::WorkloadFailed)
                .with_reason(err.as_message())
                .with_exit_code(err.exit_code()),
        );
    }

    fn finish(&self, exit_code: ServiceExitCode) {
        self.reporter.stopped(exit_code);
        self.bus
            .publish(self.event(EventKind::WorkloadStopped).with_exit_code(exit_code));
    }
}

fn phase_error(phase: &'static str, e: WorkloadError) -> ServiceError {
    let error = match e {
        WorkloadError::Fail { error } => error,
        WorkloadError::Canceled => "cancelled".to_string(),
    };
    match phase {
        "start" => ServiceError::WorkloadStartFailed { error },
        "run" => ServiceError::WorkloadRunFailed { error },
        _ => ServiceError::WorkloadStopFailed { error },
    }
}

/// Drives one activation of the workload.
pub(crate) struct LifecycleRunner {
    phases: Phases,
}

impl LifecycleRunner {
    pub(crate) fn new(
        service: Arc<str>,
        workload: WorkloadRef,
        reporter: StatusReporter,
        bus: Bus,
        timing: Timing,
    ) -> Self {
        Self {
            phases: Phases {
                service,
                workload,
                reporter,
                bus,
                timing,
                latch: Arc::new(StopLatch::default()),
            },
        }
    }

    /// Spawnable body of the lifecycle worker.
    pub(crate) async fn run(self, mut stop_rx: mpsc::UnboundedReceiver<StopRequest>) {
        let p = self.phases;

        p.bus.publish(p.event(EventKind::WorkloadStarting));
        let started = p
            .guarded(
                "start",
                ServiceState::StartPending,
                p.timing.start_wait_hint,
                p.timing.start_heartbeat,
                p.workload.start(),
            )
            .await;
        if let Err(err) = started {
            p.latch.claim();
            p.failed(&err);
            p.finish(err.exit_code());
            return;
        }

        p.reporter.advance(ServiceState::Running, Duration::ZERO);
        p.bus.publish(p.event(EventKind::WorkloadRunning));

        let ctx = CancellationToken::new();
        let run = AssertUnwindSafe(p.workload.run(ctx.clone())).catch_unwind();
        tokio::pin!(run);

        let (run_result, stop_result) = tokio::select! {
            biased;
            Some(req) = stop_rx.recv() => {
                ctx.cancel();
                let mut stopper = tokio::spawn(p.clone().stop_sequence(req.trigger));
                let (drained, joined) = tokio::select! {
                    out = &mut run => (Some(out), (&mut stopper).await),
                    joined = &mut stopper => (None, joined),
                };
                let stopped = match joined {
                    Ok(res) => res,
                    Err(join_err) => Err(ServiceError::WorkloadPanicked {
                        phase: "stop",
                        info: join_err.to_string(),
                    }),
                };
                let drained = match drained {
                    Some(out) => run_outcome(out),
                    None => p.drain(&mut run).await,
                };
                (drained, stopped)
            }
            out = &mut run => {
                let run_result = run_outcome(out);
                (run_result, p.clone().stop_sequence("run_returned").await)
            }
        };

        let mut exit_code = ServiceExitCode::NO_ERROR;
        for err in [run_result.err(), stop_result.err()].into_iter().flatten() {
            p.failed(&err);
            exit_code = err.exit_code();
        }
        p.finish(exit_code);

        while let Ok(req) = stop_rx.try_recv() {
            tracing::debug!(service = %p.service, trigger = req.trigger, "stop request after stop sequence");
            p.bus.publish(p.event(EventKind::StopIgnored));
        }
    }
}

fn run_outcome(
    out: Result<Result<(), WorkloadError>, Box<dyn Any + Send>>,
) -> Result<(), ServiceError> {
    match out {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.is_canceled() => Ok(()),
        Ok(Err(e)) => Err(phase_error("run", e)),
        Err(panic) => Err(ServiceError::WorkloadPanicked {
            phase: "run",
            info: panic_message(panic.as_ref()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_claims_once() {
        let latch = StopLatch::default();
        assert!(latch.claim());
        assert!(!latch.claim());
        assert!(!latch.claim());
    }

    #[test]
    fn test_run_cancel_is_graceful() {
        assert!(run_outcome(Ok(Err(WorkloadError::Canceled))).is_ok());
        let err = run_outcome(Ok(Err(WorkloadError::Fail {
            error: "disk full".into(),
        })))
        .unwrap_err();
        assert_eq!(err.exit_code(), ServiceExitCode::ServiceSpecific(2));
    }

    #[test]
    fn test_phase_errors_keep_phase() {
        let err = phase_error(
            "stop",
            WorkloadError::Fail {
                error: "flush".into(),
            },
        );
        assert_eq!(err.as_label(), "workload_stop_failed");
    }
}
