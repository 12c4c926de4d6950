use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use servicevisor::{
    ControlCommand, Event, EventKind, HostConfig, MemoryAuthority, ServiceError, ServiceExitCode,
    ServiceHost, ServiceState, StatusJournal, Subscribe, Workload, WorkloadError,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Probe {
    start_delay: Duration,
    stop_delay: Duration,
    fail_start: bool,
    fail_run: bool,
    ignore_cancel: bool,
    panic_stop: bool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl Probe {
    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Workload for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    async fn start(&self) -> Result<(), WorkloadError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.start_delay).await;
        if self.fail_start {
            return Err(WorkloadError::Fail {
                error: "port in use".into(),
            });
        }
        Ok(())
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkloadError> {
        if self.fail_run {
            return Err(WorkloadError::Fail {
                error: "lost upstream".into(),
            });
        }
        if self.ignore_cancel {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        ctx.cancelled().await;
        Err(WorkloadError::Canceled)
    }

    async fn stop(&self) -> Result<(), WorkloadError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.stop_delay).await;
        if self.panic_stop {
            panic!("stop exploded");
        }
        Ok(())
    }
}

#[derive(Default)]
struct Kinds(Mutex<Vec<EventKind>>);

impl Kinds {
    fn seen(&self, kind: EventKind) -> bool {
        self.0.lock().unwrap().contains(&kind)
    }
}

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }
}

fn config() -> HostConfig {
    HostConfig {
        heartbeat: false,
        grace: Duration::from_secs(5),
        ..HostConfig::new("demo")
    }
}

fn spawn_host(
    cfg: HostConfig,
    probe: Arc<Probe>,
    subs: Vec<Arc<dyn Subscribe>>,
) -> (MemoryAuthority, JoinHandle<Result<(), ServiceError>>) {
    let authority = MemoryAuthority::new();
    let host = ServiceHost::builder(cfg)
        .with_subscribers(subs)
        .build(Arc::new(authority.clone()), probe)
        .unwrap();
    let driver = std::thread::spawn(move || host.run());
    (authority, driver)
}

fn summary(authority: &MemoryAuthority) -> Vec<(ServiceState, u32)> {
    authority
        .history()
        .iter()
        .map(|s| (s.state, s.checkpoint))
        .collect()
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

const SCENARIO_A: [(ServiceState, u32); 4] = [
    (ServiceState::StartPending, 1),
    (ServiceState::Running, 0),
    (ServiceState::StopPending, 1),
    (ServiceState::Stopped, 0),
];

#[test]
fn test_clean_start_and_stop() {
    let probe = Arc::new(Probe::default());
    let (authority, driver) = spawn_host(config(), probe.clone(), Vec::new());

    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    let reply = authority.deliver(ControlCommand::Stop).unwrap();
    assert_eq!(reply.code, 0);
    driver.join().unwrap().unwrap();

    assert_eq!(summary(&authority), SCENARIO_A.to_vec());
    let history = authority.history();
    assert!(history[0].accepted.is_empty());
    assert!(history[1..].iter().all(|s| !s.accepted.is_empty()));
    assert_eq!(history[0].wait_hint, Duration::from_secs(3));
    assert_eq!(history[3].exit_code, ServiceExitCode::NO_ERROR);
    assert_eq!(probe.stops(), 1);
    assert_eq!(authority.service_name().as_deref(), Some("demo"));
}

#[test]
fn test_start_failure_reports_stopped_without_stop() {
    let probe = Arc::new(Probe {
        fail_start: true,
        ..Probe::default()
    });
    let (authority, driver) = spawn_host(config(), probe.clone(), Vec::new());
    driver.join().unwrap().unwrap();

    assert_eq!(
        summary(&authority),
        vec![(ServiceState::StartPending, 1), (ServiceState::Stopped, 0)]
    );
    let last = authority.last_status().unwrap();
    assert_eq!(last.exit_code, ServiceExitCode::ServiceSpecific(1));
    assert_eq!(last.win32_exit_code(), 1066);
    assert_eq!(probe.stops(), 0);
}

#[test]
fn test_interrogate_resubmits_last_record() {
    let probe = Arc::new(Probe::default());
    let (authority, driver) = spawn_host(config(), probe, Vec::new());
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    let before = authority.last_status().unwrap();

    let reply = authority.deliver(ControlCommand::Interrogate).unwrap();
    assert_eq!(reply.status, before);
    assert!(wait_until(|| authority.history().len() == 3));
    assert_eq!(authority.history()[2], before);

    authority.deliver(ControlCommand::Stop);
    driver.join().unwrap().unwrap();
    assert_eq!(authority.history().len(), 5);
}

#[test]
fn test_unknown_code_resubmits_unchanged() {
    let probe = Arc::new(Probe::default());
    let (authority, driver) = spawn_host(config(), probe, Vec::new());
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    let before = authority.last_status().unwrap();

    let reply = authority.deliver(ControlCommand::Other(0x80)).unwrap();
    assert_eq!(reply.code, 0);
    assert!(wait_until(|| authority.history().len() == 3));
    assert_eq!(authority.history()[2], before);

    authority.deliver(ControlCommand::Shutdown);
    driver.join().unwrap().unwrap();
}

#[test]
fn test_repeated_stop_is_idempotent() {
    let probe = Arc::new(Probe::default());
    let (authority, driver) = spawn_host(config(), probe.clone(), Vec::new());
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));

    authority.deliver(ControlCommand::Stop);
    authority.deliver(ControlCommand::Shutdown);
    driver.join().unwrap().unwrap();

    let after_stop = authority.history();
    let reply = authority.deliver(ControlCommand::Stop).unwrap();

    assert_eq!(reply.status.state, ServiceState::Stopped);
    assert_eq!(authority.history(), after_stop);
    assert_eq!(
        after_stop
            .iter()
            .filter(|s| s.state == ServiceState::Stopped)
            .count(),
        1
    );
    assert_eq!(probe.stops(), 1);
}

#[test]
fn test_service_main_returns_while_start_is_slow() {
    let probe = Arc::new(Probe {
        start_delay: Duration::from_millis(600),
        ..Probe::default()
    });
    let cfg = HostConfig {
        heartbeat: true,
        start_wait_hint: Duration::from_millis(200),
        ..config()
    };
    let (authority, driver) = spawn_host(cfg, probe, Vec::new());

    assert!(wait_until(|| authority.service_main_elapsed().is_some()));
    assert!(authority.service_main_elapsed().unwrap() < Duration::from_millis(300));

    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    authority.deliver(ControlCommand::Stop);
    driver.join().unwrap().unwrap();

    let starting: Vec<u32> = authority
        .history()
        .iter()
        .take_while(|s| s.state == ServiceState::StartPending)
        .map(|s| s.checkpoint)
        .collect();
    assert!(starting.len() >= 3, "expected heartbeats, got {starting:?}");
    assert!(starting.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(starting[0], 1);
}

#[test]
fn test_stop_during_start_is_honored_once_running() {
    let probe = Arc::new(Probe {
        start_delay: Duration::from_millis(300),
        ..Probe::default()
    });
    let (authority, driver) = spawn_host(config(), probe.clone(), Vec::new());
    assert!(authority.wait_for_handler(WAIT));
    assert!(authority.wait_for_state(ServiceState::StartPending, WAIT));

    let reply = authority.deliver(ControlCommand::Stop).unwrap();
    assert_eq!(reply.status.state, ServiceState::StartPending);
    driver.join().unwrap().unwrap();

    assert_eq!(summary(&authority), SCENARIO_A.to_vec());
    assert_eq!(probe.stops(), 1);
}

#[test]
fn test_run_failure_still_stops_workload() {
    let probe = Arc::new(Probe {
        fail_run: true,
        ..Probe::default()
    });
    let (authority, driver) = spawn_host(config(), probe.clone(), Vec::new());
    driver.join().unwrap().unwrap();

    assert_eq!(summary(&authority), SCENARIO_A.to_vec());
    assert_eq!(
        authority.last_status().unwrap().exit_code,
        ServiceExitCode::ServiceSpecific(2)
    );
    assert_eq!(probe.stops(), 1);
}

#[test]
fn test_stop_panic_maps_to_exit_code() {
    let probe = Arc::new(Probe {
        panic_stop: true,
        ..Probe::default()
    });
    let (authority, driver) = spawn_host(config(), probe.clone(), Vec::new());
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    authority.deliver(ControlCommand::Stop);
    driver.join().unwrap().unwrap();

    let last = authority.last_status().unwrap();
    assert_eq!(last.state, ServiceState::Stopped);
    assert_eq!(last.exit_code, ServiceExitCode::ServiceSpecific(4));
    assert_eq!(probe.stops(), 1);
}

#[test]
fn test_refused_dispatcher_returns_registration_failed() {
    let probe = Arc::new(Probe::default());
    let authority = MemoryAuthority::refusing_dispatcher();
    let host = ServiceHost::builder(config())
        .build(Arc::new(authority.clone()), probe.clone())
        .unwrap();

    let err = host.run().unwrap_err();

    assert!(matches!(err, ServiceError::RegistrationFailed { .. }));
    assert!(authority.history().is_empty());
    assert_eq!(probe.starts(), 0);
}

#[test]
fn test_rejected_submission_is_swallowed() {
    let probe = Arc::new(Probe::default());
    let (authority, driver) = spawn_host(config(), probe, Vec::new());
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));

    authority.set_reject_submissions(true);
    let reply = authority.deliver(ControlCommand::Interrogate).unwrap();
    assert_eq!(reply.status.state, ServiceState::Running);
    std::thread::sleep(Duration::from_millis(50));
    authority.set_reject_submissions(false);

    authority.deliver(ControlCommand::Stop);
    driver.join().unwrap().unwrap();
    assert_eq!(summary(&authority), SCENARIO_A.to_vec());
}

#[test]
fn test_journal_sees_every_report_before_run_returns() {
    let journal = Arc::new(StatusJournal::new());
    let probe = Arc::new(Probe::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![journal.clone()];
    let (authority, driver) = spawn_host(config(), probe, subs);
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    authority.deliver(ControlCommand::Stop);
    driver.join().unwrap().unwrap();

    assert_eq!(journal.transitions(), SCENARIO_A.to_vec());
}

#[test]
fn test_stop_heartbeat_checkpoints_increase_then_reset() {
    let probe = Arc::new(Probe {
        stop_delay: Duration::from_millis(550),
        ..Probe::default()
    });
    let cfg = HostConfig {
        heartbeat: true,
        stop_wait_hint: Duration::from_millis(200),
        ..config()
    };
    let (authority, driver) = spawn_host(cfg, probe.clone(), Vec::new());
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));
    authority.deliver(ControlCommand::Stop);
    driver.join().unwrap().unwrap();

    let history = summary(&authority);
    let stopping: Vec<u32> = history
        .iter()
        .skip_while(|(state, _)| *state != ServiceState::StopPending)
        .take_while(|(state, _)| *state == ServiceState::StopPending)
        .map(|(_, checkpoint)| *checkpoint)
        .collect();
    assert!(stopping.len() >= 3, "expected heartbeats, got {history:?}");
    assert_eq!(stopping[0], 1);
    assert!(stopping.windows(2).all(|w| w[0] < w[1]), "{history:?}");
    assert_eq!(history.last(), Some(&(ServiceState::Stopped, 0)));
    assert_eq!(probe.stops(), 1);
}

#[test]
fn test_stopped_reported_when_run_ignores_cancellation() {
    let probe = Arc::new(Probe {
        ignore_cancel: true,
        ..Probe::default()
    });
    let kinds = Arc::new(Kinds::default());
    let cfg = HostConfig {
        stop_wait_hint: Duration::from_millis(200),
        ..config()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![kinds.clone()];
    let (authority, driver) = spawn_host(cfg, probe.clone(), subs);
    assert!(authority.wait_for_state(ServiceState::Running, WAIT));

    authority.deliver(ControlCommand::Stop);
    assert!(authority.wait_for_state(ServiceState::Stopped, WAIT));
    driver.join().unwrap().unwrap();

    assert_eq!(summary(&authority), SCENARIO_A.to_vec());
    assert_eq!(
        authority.last_status().unwrap().exit_code,
        ServiceExitCode::NO_ERROR
    );
    assert_eq!(probe.stops(), 1);
    assert!(kinds.seen(EventKind::RunAbandoned));
}
