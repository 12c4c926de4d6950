//! # Windows Service Control Manager authority.
//!
//! Thin `windows-sys` binding of the dispatcher, handler and status calls.
//! The raw callbacks only decode arguments and forward to the Rust closures;
//! panics never unwind across the FFI boundary.

use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::sync::Mutex;

use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::Services::{
    RegisterServiceCtrlHandlerExW, SERVICE_STATUS, SERVICE_STATUS_HANDLE, SERVICE_TABLE_ENTRYW,
    SetServiceStatus, StartServiceCtrlDispatcherW,
};

use crate::authority::{ControlAuthority, ControlHandler, ServiceMain, StatusHandle};
use crate::control::{ControlCommand, EventPayload, codes};
use crate::error::ServiceError;
use crate::status::ServiceStatus;

const SERVICE_WIN32_OWN_PROCESS: u32 = 0x0000_0010;
const ERROR_CALL_NOT_IMPLEMENTED: u32 = 120;

/// Service main callback waiting for the dispatcher to call `service_main`.
static PENDING_MAIN: Mutex<Option<ServiceMain>> = Mutex::new(None);

/// `WTSSESSION_NOTIFICATION`.
#[repr(C)]
struct WtsSessionNotification {
    cb_size: u32,
    session_id: u32,
}

/// `SERVICE_TIMECHANGE_INFO`.
#[repr(C)]
struct ServiceTimeChangeInfo {
    new_time: i64,
    old_time: i64,
}

/// NUL-terminated UTF-16 copy of `s`.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn set_pending_main(main: Option<ServiceMain>) -> Option<ServiceMain> {
    let mut slot = match PENDING_MAIN.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    std::mem::replace(&mut *slot, main)
}

/// Reads a NUL-terminated UTF-16 string.
///
/// # Safety
/// `p` must be null or point to a NUL-terminated UTF-16 buffer.
unsafe fn from_wide(p: *const u16) -> String {
    if p.is_null() {
        return String::new();
    }
    let mut len = 0usize;
    // SAFETY: the caller guarantees a terminating NUL.
    unsafe {
        while *p.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(p, len))
    }
}

unsafe extern "system" fn service_main(argc: u32, argv: *mut *mut u16) {
    let mut args = Vec::with_capacity(argc as usize);
    if !argv.is_null() {
        for i in 0..argc as usize {
            // SAFETY: the SCM passes `argc` valid string pointers.
            args.push(unsafe { from_wide(*argv.add(i)) });
        }
    }
    if let Some(main) = set_pending_main(None) {
        let _ = catch_unwind(AssertUnwindSafe(move || main(args)));
    }
}

/// # Safety
/// `data` must be null or point to the structure the SCM documents for `control`.
unsafe fn read_payload(control: u32, data: *mut c_void) -> EventPayload {
    if data.is_null() {
        return EventPayload::None;
    }
    match control {
        codes::SESSION_CHANGE => {
            // SAFETY: SESSION_CHANGE carries a WTSSESSION_NOTIFICATION.
            let n = unsafe { ptr::read_unaligned(data as *const WtsSessionNotification) };
            let _ = n.cb_size;
            EventPayload::Session {
                session_id: n.session_id,
            }
        }
        codes::TIME_CHANGE => {
            // SAFETY: TIME_CHANGE carries a SERVICE_TIMECHANGE_INFO.
            let info = unsafe { ptr::read_unaligned(data as *const ServiceTimeChangeInfo) };
            EventPayload::TimeChange {
                old_filetime: info.old_time,
                new_filetime: info.new_time,
            }
        }
        _ => EventPayload::None,
    }
}

unsafe extern "system" fn control_handler(
    control: u32,
    event_type: u32,
    event_data: *mut c_void,
    context: *mut c_void,
) -> u32 {
    if context.is_null() {
        return ERROR_CALL_NOT_IMPLEMENTED;
    }
    // SAFETY: `context` is the boxed handler leaked by `register_handler`.
    let handler = unsafe { &*(context as *const ControlHandler) };
    // SAFETY: forwarded unchanged from the SCM.
    let payload = unsafe { read_payload(control, event_data) };
    let command = ControlCommand::decode(control, event_type, payload);

    catch_unwind(AssertUnwindSafe(|| handler(command).code)).unwrap_or(0)
}

/// Service Control Manager authority.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScmAuthority;

impl ScmAuthority {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ControlAuthority for ScmAuthority {
    fn run_dispatcher(&self, service: &str, main: ServiceMain) -> Result<(), ServiceError> {
        set_pending_main(Some(main));

        let mut name = to_wide(service);
        let table = [
            SERVICE_TABLE_ENTRYW {
                lpServiceName: name.as_mut_ptr(),
                lpServiceProc: Some(service_main),
            },
            SERVICE_TABLE_ENTRYW {
                lpServiceName: ptr::null_mut(),
                lpServiceProc: None,
            },
        ];

        // SAFETY: the table is NUL-terminated and outlives the call.
        let ok = unsafe { StartServiceCtrlDispatcherW(table.as_ptr()) };
        if ok == 0 {
            // SAFETY: plain thread-local error read.
            let code = unsafe { GetLastError() };
            set_pending_main(None);
            return Err(ServiceError::RegistrationFailed {
                service: service.to_string(),
                reason: format!("StartServiceCtrlDispatcherW failed with os error {code}"),
            });
        }
        Ok(())
    }

    fn register_handler(
        &self,
        service: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, ServiceError> {
        let name = to_wide(service);
        // Leaked: the SCM may call the handler until the process exits.
        let context = Box::into_raw(Box::new(handler));

        // SAFETY: `name` is NUL-terminated; `context` stays valid.
        let handle = unsafe {
            RegisterServiceCtrlHandlerExW(
                name.as_ptr(),
                Some(control_handler),
                context as *const c_void,
            )
        };
        if handle.is_null() {
            // SAFETY: plain thread-local error read.
            let code = unsafe { GetLastError() };
            // SAFETY: registration failed, so the SCM holds no reference.
            drop(unsafe { Box::from_raw(context) });
            return Err(ServiceError::HandlerRegistrationFailed {
                service: service.to_string(),
                reason: format!("RegisterServiceCtrlHandlerExW failed with os error {code}"),
            });
        }
        Ok(Box::new(ScmStatusHandle { handle }))
    }
}

struct ScmStatusHandle {
    handle: SERVICE_STATUS_HANDLE,
}

// SAFETY: a service status handle may be used from any thread and is never closed.
unsafe impl Send for ScmStatusHandle {}
// SAFETY: see above.
unsafe impl Sync for ScmStatusHandle {}

impl StatusHandle for ScmStatusHandle {
    fn submit(&self, status: &ServiceStatus) -> Result<(), ServiceError> {
        let raw = SERVICE_STATUS {
            dwServiceType: SERVICE_WIN32_OWN_PROCESS,
            dwCurrentState: status.state.to_raw(),
            dwControlsAccepted: status.accepted.bits(),
            dwWin32ExitCode: status.win32_exit_code(),
            dwServiceSpecificExitCode: status.service_specific_exit_code(),
            dwCheckPoint: status.checkpoint,
            dwWaitHint: status.wait_hint_ms(),
        };
        // SAFETY: `raw` is a fully initialised SERVICE_STATUS.
        let ok = unsafe { SetServiceStatus(self.handle, &raw) };
        if ok == 0 {
            // SAFETY: plain thread-local error read.
            let code = unsafe { GetLastError() };
            return Err(ServiceError::StatusSubmissionFailed {
                reason: format!("SetServiceStatus failed with os error {code}"),
            });
        }
        Ok(())
    }
}
