//! # Service status record.
//!
//! The control authority only ever learns about the service through the
//! [`ServiceStatus`] record: the lifecycle [`ServiceState`], the set of
//! [`ControlsAccepted`], a progress checkpoint, a wait hint and the exit code.
//!
//! ## Lifecycle order
//! ```text
//! StartPending ──► Running ──► StopPending ──► Stopped
//!       │                                        ▲
//!       └──────────── (start failed) ────────────┘
//! ```
//! [`ServiceState`] derives `Ord` in this order, so "no regression" checks are
//! plain comparisons.
//!
//! ## Raw values
//! Every type exposes `to_raw`/`bits` returning the value the platform ABI
//! expects, so a backend can copy fields into the native record unchanged.

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

/// `ERROR_SERVICE_SPECIFIC_ERROR`: the win32 exit code that tells the authority
/// to read the service-specific exit code instead.
pub const ERROR_SERVICE_SPECIFIC_ERROR: u32 = 1066;

/// Lifecycle state of the hosted service.
///
/// Variants are declared in lifecycle order; comparisons follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceState {
    /// Registered with the authority, workload is starting.
    StartPending,
    /// Workload started and is running.
    Running,
    /// Stop requested, workload is shutting down.
    StopPending,
    /// Terminal state of the activation.
    Stopped,
}

impl ServiceState {
    /// Returns the platform `SERVICE_*` state value.
    pub fn to_raw(self) -> u32 {
        match self {
            ServiceState::Stopped => 0x1,
            ServiceState::StartPending => 0x2,
            ServiceState::StopPending => 0x3,
            ServiceState::Running => 0x4,
        }
    }

    /// Parses a platform state value; pause-related states are not modelled.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1 => Some(ServiceState::Stopped),
            0x2 => Some(ServiceState::StartPending),
            0x3 => Some(ServiceState::StopPending),
            0x4 => Some(ServiceState::Running),
            _ => None,
        }
    }

    /// True for the two states that carry a checkpoint.
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(self, ServiceState::StartPending | ServiceState::StopPending)
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Stopped)
    }

    /// Short stable name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::StartPending => "start_pending",
            ServiceState::Running => "running",
            ServiceState::StopPending => "stop_pending",
            ServiceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of control codes the service claims it can handle.
///
/// Bit values match the platform `SERVICE_ACCEPT_*` flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlsAccepted(u32);

impl ControlsAccepted {
    pub const NONE: Self = Self(0);
    pub const STOP: Self = Self(0x0000_0001);
    pub const SHUTDOWN: Self = Self(0x0000_0004);
    pub const PARAM_CHANGE: Self = Self(0x0000_0008);
    pub const NET_BIND_CHANGE: Self = Self(0x0000_0010);
    pub const HARDWARE_PROFILE_CHANGE: Self = Self(0x0000_0020);
    pub const POWER_EVENT: Self = Self(0x0000_0040);
    pub const SESSION_CHANGE: Self = Self(0x0000_0080);
    pub const TIME_CHANGE: Self = Self(0x0000_0200);

    /// Stop, shutdown and every notification the dispatcher decodes.
    ///
    /// Pre-shutdown is not included; the dispatcher handles it as an unknown code.
    pub fn extended() -> Self {
        Self::STOP
            | Self::SHUTDOWN
            | Self::PARAM_CHANGE
            | Self::NET_BIND_CHANGE
            | Self::HARDWARE_PROFILE_CHANGE
            | Self::POWER_EVENT
            | Self::SESSION_CHANGE
            | Self::TIME_CHANGE
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ControlsAccepted {
    /// Stop and shutdown only.
    fn default() -> Self {
        Self::STOP | Self::SHUTDOWN
    }
}

impl BitOr for ControlsAccepted {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ControlsAccepted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlsAccepted({:#x})", self.0)
    }
}

/// Exit code carried by the status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceExitCode {
    /// Plain win32 error code (`0` = success).
    Win32(u32),
    /// Application-defined code; the win32 code becomes
    /// [`ERROR_SERVICE_SPECIFIC_ERROR`].
    ServiceSpecific(u32),
}

impl ServiceExitCode {
    pub const NO_ERROR: Self = ServiceExitCode::Win32(0);

    /// Value for the `win32ExitCode` field.
    pub fn win32(self) -> u32 {
        match self {
            ServiceExitCode::Win32(code) => code,
            ServiceExitCode::ServiceSpecific(_) => ERROR_SERVICE_SPECIFIC_ERROR,
        }
    }

    /// Value for the `serviceSpecificExitCode` field.
    pub fn service_specific(self) -> u32 {
        match self {
            ServiceExitCode::Win32(_) => 0,
            ServiceExitCode::ServiceSpecific(code) => code,
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::NO_ERROR
    }
}

impl Default for ServiceExitCode {
    fn default() -> Self {
        Self::NO_ERROR
    }
}

/// Status record submitted to the control authority.
///
/// ### Invariants (maintained by the status reporter)
/// - `accepted` is empty exactly while `state == StartPending`;
/// - `checkpoint == 0` for `Running` and `Stopped`, strictly increasing across
///   consecutive pending reports otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepted: ControlsAccepted,
    pub checkpoint: u32,
    pub wait_hint: Duration,
    pub exit_code: ServiceExitCode,
}

impl ServiceStatus {
    /// Record before anything has been reported: `StartPending`, nothing accepted.
    pub fn initial() -> Self {
        Self {
            state: ServiceState::StartPending,
            accepted: ControlsAccepted::NONE,
            checkpoint: 0,
            wait_hint: Duration::ZERO,
            exit_code: ServiceExitCode::NO_ERROR,
        }
    }

    /// Wait hint in milliseconds, saturated to `u32`.
    pub fn wait_hint_ms(&self) -> u32 {
        self.wait_hint.as_millis().min(u128::from(u32::MAX)) as u32
    }

    #[inline]
    pub fn win32_exit_code(&self) -> u32 {
        self.exit_code.win32()
    }

    #[inline]
    pub fn service_specific_exit_code(&self) -> u32 {
        self.exit_code.service_specific()
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_ordered_by_lifecycle() {
        assert!(ServiceState::StartPending < ServiceState::Running);
        assert!(ServiceState::Running < ServiceState::StopPending);
        assert!(ServiceState::StopPending < ServiceState::Stopped);
    }

    #[test]
    fn test_state_raw_values_match_platform() {
        for state in [
            ServiceState::StartPending,
            ServiceState::Running,
            ServiceState::StopPending,
            ServiceState::Stopped,
        ] {
            assert_eq!(ServiceState::from_raw(state.to_raw()), Some(state));
        }
        assert_eq!(ServiceState::Stopped.to_raw(), 1);
        assert_eq!(ServiceState::Running.to_raw(), 4);
        assert_eq!(ServiceState::from_raw(7), None);
    }

    #[test]
    fn test_pending_and_terminal() {
        assert!(ServiceState::StartPending.is_pending());
        assert!(ServiceState::StopPending.is_pending());
        assert!(!ServiceState::Running.is_pending());
        assert!(ServiceState::Stopped.is_terminal());
        assert!(!ServiceState::StopPending.is_terminal());
    }

    #[test]
    fn test_default_mask_is_stop_and_shutdown() {
        let mask = ControlsAccepted::default();
        assert_eq!(mask.bits(), 0x5);
        assert!(mask.contains(ControlsAccepted::STOP));
        assert!(mask.contains(ControlsAccepted::SHUTDOWN));
        assert!(!mask.contains(ControlsAccepted::POWER_EVENT));
    }

    #[test]
    fn test_extended_mask() {
        let mask = ControlsAccepted::extended();
        assert!(mask.contains(ControlsAccepted::default()));
        assert!(mask.contains(ControlsAccepted::SESSION_CHANGE | ControlsAccepted::TIME_CHANGE));
        assert_eq!(mask.bits() & 0x100, 0, "pre-shutdown must not be accepted");
    }

    #[test]
    fn test_service_specific_exit_code_fields() {
        let code = ServiceExitCode::ServiceSpecific(7);
        assert_eq!(code.win32(), ERROR_SERVICE_SPECIFIC_ERROR);
        assert_eq!(code.service_specific(), 7);
        assert!(!code.is_success());

        assert_eq!(ServiceExitCode::NO_ERROR.win32(), 0);
        assert_eq!(ServiceExitCode::NO_ERROR.service_specific(), 0);
    }

    #[test]
    fn test_wait_hint_saturates() {
        let mut status = ServiceStatus::initial();
        status.wait_hint = Duration::from_millis(3000);
        assert_eq!(status.wait_hint_ms(), 3000);

        status.wait_hint = Duration::from_secs(u64::MAX / 1000);
        assert_eq!(status.wait_hint_ms(), u32::MAX);
    }
}
