//! # In-process control authority.
//!
//! [`MemoryAuthority`] plays the role of the service control manager inside
//! the current process: it launches the service main callback on its own
//! thread, records every submitted status and lets callers deliver control
//! commands with [`MemoryAuthority::deliver`].
//!
//! Cloning is cheap; all clones observe the same activation.
//!
//! ```text
//! run_dispatcher(name, main)
//!   ├─ refused?           → Err(RegistrationFailed)
//!   ├─ spawn "authority-main" thread → main(args)
//!   └─ wait until Stopped was submitted
//!        (or main returned without registering a handler)
//! ```

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::authority::{ControlAuthority, ControlHandler, ControlReply, ServiceMain, StatusHandle};
use crate::control::ControlCommand;
use crate::error::ServiceError;
use crate::status::{ServiceState, ServiceStatus};

#[derive(Default)]
struct Inner {
    args: Vec<String>,
    refusal: Option<String>,
    reject_submissions: bool,
    service: Option<String>,
    handler: Option<ControlHandler>,
    history: Vec<ServiceStatus>,
    closed: bool,
    main_done: bool,
    main_elapsed: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-process control authority.
#[derive(Clone, Default)]
pub struct MemoryAuthority {
    shared: Arc<Shared>,
}

impl MemoryAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start arguments passed to the service main callback.
    #[must_use]
    pub fn with_args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared.lock().args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Authority that refuses the dispatcher, like a process started from a console.
    #[must_use]
    pub fn refusing_dispatcher() -> Self {
        let authority = Self::new();
        authority.shared.lock().refusal =
            Some("process was not launched by the control authority".to_string());
        authority
    }

    /// Makes subsequent status submissions fail (handle torn down).
    pub fn set_reject_submissions(&self, reject: bool) {
        self.shared.lock().reject_submissions = reject;
    }

    /// Delivers a control command to the registered handler.
    ///
    /// Returns `None` when no handler is registered yet. The handler runs on
    /// the calling thread, outside the authority lock.
    pub fn deliver(&self, command: ControlCommand) -> Option<ControlReply> {
        let handler = self.shared.lock().handler.clone()?;
        Some(handler(command))
    }

    /// Every accepted submission, in order.
    pub fn history(&self) -> Vec<ServiceStatus> {
        self.shared.lock().history.clone()
    }

    pub fn last_status(&self) -> Option<ServiceStatus> {
        self.shared.lock().history.last().copied()
    }

    /// Name the handler was registered under.
    pub fn service_name(&self) -> Option<String> {
        self.shared.lock().service.clone()
    }

    /// How long the service main callback took to return.
    pub fn service_main_elapsed(&self) -> Option<Duration> {
        self.shared.lock().main_elapsed
    }

    /// Blocks until a record with `state` was submitted. Returns `false` on timeout.
    pub fn wait_for_state(&self, state: ServiceState, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let waited = self.shared.changed.wait_timeout_while(guard, timeout, |inner| {
            !inner.history.iter().any(|s| s.state == state)
        });
        match waited {
            Ok((_, res)) => !res.timed_out(),
            Err(poisoned) => !poisoned.into_inner().1.timed_out(),
        }
    }

    /// Blocks until the handler is registered. Returns `false` on timeout.
    pub fn wait_for_handler(&self, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let waited = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |inner| inner.handler.is_none());
        match waited {
            Ok((_, res)) => !res.timed_out(),
            Err(poisoned) => !poisoned.into_inner().1.timed_out(),
        }
    }
}

impl ControlAuthority for MemoryAuthority {
    fn run_dispatcher(&self, service: &str, main: ServiceMain) -> Result<(), ServiceError> {
        let args = {
            let inner = self.shared.lock();
            if let Some(reason) = &inner.refusal {
                return Err(ServiceError::RegistrationFailed {
                    service: service.to_string(),
                    reason: reason.clone(),
                });
            }
            inner.args.clone()
        };

        let shared = Arc::clone(&self.shared);
        let main_thread = std::thread::Builder::new()
            .name("authority-main".to_string())
            .spawn(move || {
                let began = Instant::now();
                main(args);
                let mut inner = shared.lock();
                inner.main_done = true;
                inner.main_elapsed = Some(began.elapsed());
                shared.changed.notify_all();
            })
            .map_err(|e| ServiceError::RegistrationFailed {
                service: service.to_string(),
                reason: format!("spawn service main thread: {e}"),
            })?;

        {
            let guard = self.shared.lock();
            let _guard = self
                .shared
                .changed
                .wait_while(guard, |inner| {
                    !(inner.closed || (inner.main_done && inner.handler.is_none()))
                })
                .map_err(|_| ServiceError::RegistrationFailed {
                    service: service.to_string(),
                    reason: "authority state poisoned".to_string(),
                })?;
        }
        let _ = main_thread.join();
        Ok(())
    }

    fn register_handler(
        &self,
        service: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, ServiceError> {
        let mut inner = self.shared.lock();
        if inner.handler.is_some() {
            return Err(ServiceError::HandlerRegistrationFailed {
                service: service.to_string(),
                reason: "a handler is already registered".to_string(),
            });
        }
        inner.service = Some(service.to_string());
        inner.handler = Some(handler);
        self.shared.changed.notify_all();
        Ok(Box::new(MemoryStatusHandle {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryStatusHandle {
    shared: Arc<Shared>,
}

impl StatusHandle for MemoryStatusHandle {
    fn submit(&self, status: &ServiceStatus) -> Result<(), ServiceError> {
        let mut inner = self.shared.lock();
        if inner.closed {
            return Err(ServiceError::StatusSubmissionFailed {
                reason: "handle closed".to_string(),
            });
        }
        if inner.reject_submissions {
            return Err(ServiceError::StatusSubmissionFailed {
                reason: "submission rejected by authority".to_string(),
            });
        }
        inner.history.push(*status);
        if status.state == ServiceState::Stopped {
            inner.closed = true;
        }
        self.shared.changed.notify_all();
        Ok(())
    }
}
