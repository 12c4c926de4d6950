//! Error types used by the service host, hosted workloads and registry clients.
//!
//! This module defines three enums:
//!
//! - [`ServiceError`] — failures of the host itself and of the workload phases it drives.
//! - [`WorkloadError`] — errors returned by a [`Workload`](crate::Workload) implementation.
//! - [`RegistryError`] — failures of [`ServiceRegistry`](crate::ServiceRegistry) calls.
//!
//! All of them provide `as_label` (stable snake_case, for logs/metrics) and `as_message`.

use thiserror::Error;

use crate::status::ServiceExitCode;

/// # Errors produced by the service host.
///
/// Only the registration failures and [`ServiceError::Runtime`] ever leave
/// [`ServiceHost::run`](crate::ServiceHost::run). Everything else is caught
/// inside the host, logged and, for workload failures, turned into a terminal
/// `Stopped` report carrying [`ServiceError::exit_code`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The authority refused the dispatcher (typically: process not launched by it).
    #[error("registration of '{service}' with the control authority failed: {reason}")]
    RegistrationFailed {
        /// Service name passed to the authority.
        service: String,
        /// Platform reason.
        reason: String,
    },

    /// The control handler could not be registered from the service main callback.
    #[error("control handler registration for '{service}' failed: {reason}")]
    HandlerRegistrationFailed {
        /// Service name passed to the authority.
        service: String,
        /// Platform reason.
        reason: String,
    },

    /// The authority rejected a status submission (handle already torn down).
    #[error("status submission rejected: {reason}")]
    StatusSubmissionFailed {
        /// Platform reason.
        reason: String,
    },

    /// `Workload::start` returned an error.
    #[error("workload start failed: {error}")]
    WorkloadStartFailed {
        /// Underlying workload error message.
        error: String,
    },

    /// `Workload::run` returned an error.
    #[error("workload run failed: {error}")]
    WorkloadRunFailed {
        /// Underlying workload error message.
        error: String,
    },

    /// `Workload::stop` returned an error.
    #[error("workload stop failed: {error}")]
    WorkloadStopFailed {
        /// Underlying workload error message.
        error: String,
    },

    /// A workload phase panicked.
    #[error("workload panicked during {phase}: {info}")]
    WorkloadPanicked {
        /// `start`, `run` or `stop`.
        phase: &'static str,
        /// Panic payload, when it was a string.
        info: String,
    },

    /// The host runtime could not be built.
    #[error("failed to build host runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servicevisor::ServiceError;
    ///
    /// let err = ServiceError::WorkloadStartFailed { error: "port in use".into() };
    /// assert_eq!(err.as_label(), "workload_start_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::RegistrationFailed { .. } => "registration_failed",
            ServiceError::HandlerRegistrationFailed { .. } => "handler_registration_failed",
            ServiceError::StatusSubmissionFailed { .. } => "status_submission_failed",
            ServiceError::WorkloadStartFailed { .. } => "workload_start_failed",
            ServiceError::WorkloadRunFailed { .. } => "workload_run_failed",
            ServiceError::WorkloadStopFailed { .. } => "workload_stop_failed",
            ServiceError::WorkloadPanicked { .. } => "workload_panicked",
            ServiceError::Runtime(_) => "runtime_build_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ServiceError::RegistrationFailed { service, reason } => {
                format!("service={service} registration failed: {reason}")
            }
            ServiceError::HandlerRegistrationFailed { service, reason } => {
                format!("service={service} handler registration failed: {reason}")
            }
            ServiceError::StatusSubmissionFailed { reason } => format!("submission: {reason}"),
            ServiceError::WorkloadStartFailed { error } => format!("start: {error}"),
            ServiceError::WorkloadRunFailed { error } => format!("run: {error}"),
            ServiceError::WorkloadStopFailed { error } => format!("stop: {error}"),
            ServiceError::WorkloadPanicked { phase, info } => format!("panic in {phase}: {info}"),
            ServiceError::Runtime(e) => format!("runtime: {e}"),
        }
    }

    /// Exit code reported with the terminal `Stopped` status.
    ///
    /// Workload failures map to service-specific codes: start `1`, run `2`,
    /// stop `3`, panic `4`. Host-level failures use `255`.
    pub fn exit_code(&self) -> ServiceExitCode {
        let code = match self {
            ServiceError::WorkloadStartFailed { .. } => 1,
            ServiceError::WorkloadRunFailed { .. } => 2,
            ServiceError::WorkloadStopFailed { .. } => 3,
            ServiceError::WorkloadPanicked { .. } => 4,
            _ => 255,
        };
        ServiceExitCode::ServiceSpecific(code)
    }
}

/// # Errors returned by workload implementations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// The phase failed.
    #[error("workload failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The phase observed cancellation and exited early.
    ///
    /// Returned from `run` this is a graceful exit, not a failure.
    #[error("workload cancelled")]
    Canceled,
}

impl WorkloadError {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkloadError::Fail { .. } => "workload_fail",
            WorkloadError::Canceled => "workload_canceled",
        }
    }

    pub fn as_message(&self) -> String {
        match self {
            WorkloadError::Fail { error } => format!("error: {error}"),
            WorkloadError::Canceled => "cancelled".to_string(),
        }
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        matches!(self, WorkloadError::Canceled)
    }
}

/// # Errors produced by service registry clients.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The caller lacks the privilege the authority requires for this operation.
    #[error("{operation} '{service}' requires administrative privileges")]
    PermissionDenied {
        /// Registry operation (`install`, `remove`, ...).
        operation: &'static str,
        /// Target service.
        service: String,
    },

    /// No service with that name is installed.
    #[error("service '{service}' is not installed")]
    NotFound {
        /// Target service.
        service: String,
    },

    /// A service with that name is already installed.
    #[error("service '{service}' is already installed")]
    AlreadyExists {
        /// Target service.
        service: String,
    },

    /// The service is not in a state that allows the operation.
    #[error("service '{service}' cannot {operation}: {reason}")]
    InvalidState {
        /// Registry operation.
        operation: &'static str,
        /// Target service.
        service: String,
        /// Current state description.
        reason: String,
    },

    /// Any other platform failure.
    #[error("{operation} failed with os error {code}")]
    Os {
        /// Registry operation.
        operation: &'static str,
        /// Platform error code.
        code: u32,
    },
}

impl RegistryError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::PermissionDenied { .. } => "registry_permission_denied",
            RegistryError::NotFound { .. } => "registry_not_found",
            RegistryError::AlreadyExists { .. } => "registry_already_exists",
            RegistryError::InvalidState { .. } => "registry_invalid_state",
            RegistryError::Os { .. } => "registry_os_error",
        }
    }

    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_failures_map_to_distinct_exit_codes() {
        let start = ServiceError::WorkloadStartFailed { error: "x".into() };
        let run = ServiceError::WorkloadRunFailed { error: "x".into() };
        let stop = ServiceError::WorkloadStopFailed { error: "x".into() };
        let panic = ServiceError::WorkloadPanicked {
            phase: "run",
            info: "boom".into(),
        };

        assert_eq!(start.exit_code(), ServiceExitCode::ServiceSpecific(1));
        assert_eq!(run.exit_code(), ServiceExitCode::ServiceSpecific(2));
        assert_eq!(stop.exit_code(), ServiceExitCode::ServiceSpecific(3));
        assert_eq!(panic.exit_code(), ServiceExitCode::ServiceSpecific(4));
        assert!(!start.exit_code().is_success());
    }

    #[test]
    fn test_labels_are_stable() {
        let err = ServiceError::RegistrationFailed {
            service: "demo".into(),
            reason: "not launched by the authority".into(),
        };
        assert_eq!(err.as_label(), "registration_failed");
        assert!(err.to_string().contains("demo"));

        let err = RegistryError::PermissionDenied {
            operation: "install",
            service: "demo".into(),
        };
        assert_eq!(err.as_label(), "registry_permission_denied");
        assert_eq!(
            err.to_string(),
            "install 'demo' requires administrative privileges"
        );
    }

    #[test]
    fn test_canceled_is_not_a_failure_label() {
        assert!(WorkloadError::Canceled.is_canceled());
        assert_eq!(WorkloadError::Canceled.as_label(), "workload_canceled");
        let fail = WorkloadError::Fail { error: "io".into() };
        assert!(!fail.is_canceled());
        assert_eq!(fail.as_message(), "error: io");
    }
}
