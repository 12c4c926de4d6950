//! # Host configuration.
//!
//! Provides [`HostConfig`], the settings of one [`ServiceHost`](crate::ServiceHost).
//!
//! ## Sentinel values
//! - `start_wait_hint = 0s` / `stop_wait_hint = 0s` → no heartbeat for that phase
//! - `grace = 0s` → do not wait for the lifecycle worker after the dispatcher returns
//! - `worker_threads = 0` → clamped to 1

use std::time::Duration;

use crate::status::ControlsAccepted;

/// Configuration of a service host.
///
/// ## Field semantics
/// - `service_name`: name registered with the control authority
/// - `start_wait_hint` / `stop_wait_hint`: wait hint of the pending reports
/// - `accepted_controls`: mask reported outside `StartPending`
/// - `heartbeat`: re-report pending states every half wait hint while a phase runs
/// - `log_noisy_controls`: log `ControlReceived` for interrogate, power and session codes at `info`
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `worker_threads`: threads of the host-owned runtime (min 1)
/// - `grace`: how long `run()` waits for the lifecycle worker once the dispatcher returned
///
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct HostConfig {
    pub service_name: String,
    pub start_wait_hint: Duration,
    pub stop_wait_hint: Duration,
    pub accepted_controls: ControlsAccepted,
    pub heartbeat: bool,
    pub log_noisy_controls: bool,
    pub bus_capacity: usize,
    pub worker_threads: usize,
    pub grace: Duration,
}

impl HostConfig {
    /// Default configuration for `service_name`.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Returns the heartbeat period for a phase reported with `wait_hint`.
    ///
    /// - `None` → heartbeat disabled or zero wait hint
    /// - `Some(d)` → half the wait hint, at least 1ms
    #[inline]
    pub fn heartbeat_period(&self, wait_hint: Duration) -> Option<Duration> {
        if !self.heartbeat || wait_hint.is_zero() {
            None
        } else {
            Some((wait_hint / 2).max(Duration::from_millis(1)))
        }
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn worker_threads_clamped(&self) -> usize {
        self.worker_threads.max(1)
    }
}

impl Default for HostConfig {
    /// Default configuration:
    ///
    /// - `service_name = "servicevisor"`
    /// - `start_wait_hint = stop_wait_hint = 3s`
    /// - `accepted_controls = STOP | SHUTDOWN`
    /// - `heartbeat = true`, `log_noisy_controls = false`
    /// - `bus_capacity = 1024`, `worker_threads = 2`, `grace = 30s`
    fn default() -> Self {
        Self {
            service_name: "servicevisor".to_string(),
            start_wait_hint: Duration::from_secs(3),
            stop_wait_hint: Duration::from_secs(3),
            accepted_controls: ControlsAccepted::default(),
            heartbeat: true,
            log_noisy_controls: false,
            bus_capacity: 1024,
            worker_threads: 2,
            grace: Duration::from_secs(30),
        }
    }
}
