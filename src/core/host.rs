//! # ServiceHost: one process-wide service activation.
//!
//! The [`ServiceHost`] owns the tokio runtime, the event bus, the subscriber
//! listener and the control authority. [`ServiceHost::run`] hands the calling
//! thread to the authority and returns once the activation ended.
//!
//! ## High-level architecture
//! ```text
//! run():
//!   authority.run_dispatcher(name, main)                      (blocks caller)
//!     └─► main(args)                                          (authority thread)
//!           ├─ StatusReporter::channel()  + stop channel
//!           ├─ register_handler(ControlDispatcher::handle) ─► StatusHandle
//!           ├─ spawn StatusActor(handle)
//!           ├─ report(StartPending, start_wait_hint)
//!           └─ spawn LifecycleRunner ─────────────┐           (returns immediately)
//!                                                 ▼
//!   authority thread: handler(cmd) ─► ControlDispatcher ─► reporter / stop channel
//!
//! dispatcher returned:
//!   ├─ Ok  → publish DispatcherExited
//!   └─ Err → publish RegistrationFailed
//!   wind_down():
//!     ├─ wait lifecycle worker (≤ grace, else GraceExceeded)
//!     ├─ reporter.close()          (every report submitted and published)
//!     └─ cancel listener → drain bus → SubscriberSet::shutdown()
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use servicevisor::{
//!     ControlCommand, HostConfig, LogWriter, MemoryAuthority, ServiceHost, ServiceState,
//!     Subscribe, WorkloadError, WorkloadFn,
//! };
//!
//! let authority = MemoryAuthority::new();
//! let workload = WorkloadFn::arc("demo", |ctx: CancellationToken| async move {
//!     ctx.cancelled().await;
//!     Err::<(), _>(WorkloadError::Canceled)
//! });
//! let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//! let host = ServiceHost::builder(HostConfig::new("demo"))
//!     .with_subscribers(subs)
//!     .build(Arc::new(authority.clone()), workload)
//!     .expect("runtime");
//!
//! let driver = std::thread::spawn(move || host.run());
//! assert!(authority.wait_for_state(ServiceState::Running, Duration::from_secs(5)));
//! authority.deliver(ControlCommand::Stop);
//! driver.join().unwrap().unwrap();
//!
//! assert_eq!(authority.last_status().unwrap().state, ServiceState::Stopped);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::authority::{ControlAuthority, ControlHandler, ServiceMain};
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};
use crate::status::ServiceState;
use crate::subscribers::SubscriberSet;
use crate::workload::WorkloadRef;

use super::builder::ServiceHostBuilder;
use super::config::HostConfig;
use super::dispatcher::ControlDispatcher;
use super::lifecycle::{LifecycleRunner, Timing};
use super::reporter::{StatusActor, StatusReporter};

/// What the service main callback leaves behind for `run()`.
#[derive(Default)]
struct Activation {
    runner: Option<JoinHandle<()>>,
    reporter: Option<StatusReporter>,
    error: Option<ServiceError>,
}

fn lock(slot: &Mutex<Activation>) -> MutexGuard<'_, Activation> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Hosts one workload as a service under a control authority.
pub struct ServiceHost {
    cfg: HostConfig,
    runtime: Runtime,
    bus: Bus,
    authority: Arc<dyn ControlAuthority>,
    workload: WorkloadRef,
    listener: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl ServiceHost {
    /// Returns a builder for the given configuration.
    pub fn builder(cfg: HostConfig) -> ServiceHostBuilder {
        ServiceHostBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: HostConfig,
        runtime: Runtime,
        bus: Bus,
        authority: Arc<dyn ControlAuthority>,
        workload: WorkloadRef,
        listener: JoinHandle<()>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            runtime,
            bus,
            authority,
            workload,
            listener,
            shutdown,
        }
    }

    /// Bus the host publishes on; subscribe before calling [`run`](Self::run).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Connects to the control authority and blocks until the activation ends.
    ///
    /// Must not be called from inside an async context.
    ///
    /// # Errors
    /// [`ServiceError::RegistrationFailed`] when the authority refuses the
    /// dispatcher, [`ServiceError::HandlerRegistrationFailed`] when it refuses the
    /// control handler. Workload failures are reported through the exit code of
    /// the `Stopped` status, not here.
    pub fn run(self) -> Result<(), ServiceError> {
        let service: Arc<str> = Arc::from(self.cfg.service_name.as_str());
        let slot = Arc::new(Mutex::new(Activation::default()));

        let main = self.service_main(Arc::clone(&service), Arc::clone(&slot));
        let dispatched = self.authority.run_dispatcher(&service, main);

        match &dispatched {
            Ok(()) => self
                .bus
                .publish(Event::new(EventKind::DispatcherExited).with_service(Arc::clone(&service))),
            Err(e) => self.bus.publish(
                Event::new(EventKind::RegistrationFailed)
                    .with_service(Arc::clone(&service))
                    .with_reason(e.as_message()),
            ),
        }

        let activation = std::mem::take(&mut *lock(&slot));
        let ServiceHost {
            cfg,
            runtime,
            bus,
            listener,
            shutdown,
            ..
        } = self;
        runtime.block_on(wind_down(
            activation.runner,
            activation.reporter,
            cfg.grace,
            bus,
            service,
            listener,
            shutdown,
        ));
        runtime.shutdown_timeout(Duration::from_secs(1));

        dispatched?;
        match activation.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Builds the callback the authority invokes on its own thread.
    fn service_main(&self, service: Arc<str>, slot: Arc<Mutex<Activation>>) -> ServiceMain {
        let rt = self.runtime.handle().clone();
        let authority = Arc::clone(&self.authority);
        let workload = Arc::clone(&self.workload);
        let bus = self.bus.clone();
        let cfg = self.cfg.clone();

        Box::new(move |args: Vec<String>| {
            tracing::debug!(service = %service, ?args, "service main");

            let (reporter, inbox) = StatusReporter::channel();
            let (stop_tx, stop_rx) = mpsc::unbounded_channel();
            let dispatcher = Arc::new(ControlDispatcher::new(
                Arc::clone(&service),
                reporter.clone(),
                stop_tx,
                bus.clone(),
                cfg.stop_wait_hint,
                cfg.log_noisy_controls,
            ));
            let handler: ControlHandler = Arc::new(move |cmd| dispatcher.handle(cmd));

            let status_handle = match authority.register_handler(&service, handler) {
                Ok(handle) => handle,
                Err(e) => {
                    bus.publish(
                        Event::new(EventKind::RegistrationFailed)
                            .with_service(Arc::clone(&service))
                            .with_reason(e.as_message()),
                    );
                    lock(&slot).error = Some(e);
                    return;
                }
            };

            let actor = StatusActor::new(
                Arc::clone(&service),
                cfg.accepted_controls,
                status_handle,
                inbox,
                bus.clone(),
            );
            rt.spawn(actor.run());
            reporter.report(ServiceState::StartPending, cfg.start_wait_hint);

            let timing = Timing {
                start_wait_hint: cfg.start_wait_hint,
                stop_wait_hint: cfg.stop_wait_hint,
                start_heartbeat: cfg.heartbeat_period(cfg.start_wait_hint),
                stop_heartbeat: cfg.heartbeat_period(cfg.stop_wait_hint),
            };
            let runner = LifecycleRunner::new(
                Arc::clone(&service),
                Arc::clone(&workload),
                reporter.clone(),
                bus.clone(),
                timing,
            );
            let join = rt.spawn(runner.run(stop_rx));

            let mut activation = lock(&slot);
            activation.runner = Some(join);
            activation.reporter = Some(reporter);
        })
    }
}

async fn wind_down(
    runner: Option<JoinHandle<()>>,
    reporter: Option<StatusReporter>,
    grace: Duration,
    bus: Bus,
    service: Arc<str>,
    listener: JoinHandle<()>,
    shutdown: CancellationToken,
) {
    if let Some(runner) = runner {
        if tokio::time::timeout(grace, runner).await.is_err() {
            bus.publish(
                Event::new(EventKind::GraceExceeded)
                    .with_service(Arc::clone(&service))
                    .with_reason(format!("lifecycle worker still running after {grace:?}")),
            );
        }
    }
    if let Some(reporter) = reporter {
        reporter.close().await;
    }
    shutdown.cancel();
    let _ = listener.await;
}

/// Forwards bus events to the subscribers until `shutdown`, then drains.
pub(super) async fn listen(
    mut rx: broadcast::Receiver<Event>,
    subs: SubscriberSet,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Ok(ev) => subs.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
    loop {
        match rx.try_recv() {
            Ok(ev) => subs.emit(&ev),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    subs.shutdown().await;
}
