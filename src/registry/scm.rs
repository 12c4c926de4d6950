//! # Service Control Manager registry.
//!
//! Each call opens the SCM database with the narrowest access right the
//! operation needs and closes every handle on return.

use std::ffi::c_void;
use std::os::windows::process::CommandExt;
use std::process::Command;
use std::ptr;

use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::Services::{
    ChangeServiceConfig2W, CloseServiceHandle, ControlService, CreateServiceW, DeleteService,
    OpenSCManagerW, OpenServiceW, QueryServiceStatus, SC_HANDLE, SERVICE_DESCRIPTIONW,
    SERVICE_STATUS, StartServiceW,
};

use crate::authority::to_wide;
use crate::control::codes;
use crate::error::RegistryError;
use crate::registry::{ServiceDefinition, ServiceRegistry};
use crate::status::ServiceState;

const TARGET: &str = "servicevisor::registry";

const SC_MANAGER_CONNECT: u32 = 0x0001;
const SC_MANAGER_CREATE_SERVICE: u32 = 0x0002;
const SC_MANAGER_ALL_ACCESS: u32 = 0x000F_003F;

const SERVICE_QUERY_CONFIG: u32 = 0x0001;
const SERVICE_QUERY_STATUS: u32 = 0x0004;
const SERVICE_START: u32 = 0x0010;
const SERVICE_STOP: u32 = 0x0020;
const DELETE: u32 = 0x0001_0000;
const SERVICE_ALL_ACCESS: u32 = 0x000F_01FF;

const SERVICE_WIN32_OWN_PROCESS: u32 = 0x0000_0010;
const SERVICE_AUTO_START: u32 = 0x0000_0002;
const SERVICE_ERROR_NORMAL: u32 = 0x0000_0001;
const SERVICE_CONFIG_DESCRIPTION: u32 = 1;

const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_SERVICE_ALREADY_RUNNING: u32 = 1056;
const ERROR_SERVICE_DOES_NOT_EXIST: u32 = 1060;
const ERROR_SERVICE_NOT_ACTIVE: u32 = 1062;
const ERROR_SERVICE_EXISTS: u32 = 1073;

const DETACHED_PROCESS: u32 = 0x0000_0008;

/// Owned SCM handle, closed on drop.
struct ScHandle(SC_HANDLE);

impl Drop for ScHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was returned non-null by the SCM and is closed once.
        unsafe {
            CloseServiceHandle(self.0);
        }
    }
}

fn last_error() -> u32 {
    // SAFETY: plain thread-local error read.
    unsafe { GetLastError() }
}

fn map_error(operation: &'static str, service: &str, code: u32) -> RegistryError {
    let service = service.to_string();
    match code {
        ERROR_ACCESS_DENIED => RegistryError::PermissionDenied { operation, service },
        ERROR_SERVICE_DOES_NOT_EXIST => RegistryError::NotFound { service },
        ERROR_SERVICE_EXISTS => RegistryError::AlreadyExists { service },
        ERROR_SERVICE_ALREADY_RUNNING => RegistryError::InvalidState {
            operation,
            service,
            reason: "already running".to_string(),
        },
        ERROR_SERVICE_NOT_ACTIVE => RegistryError::InvalidState {
            operation,
            service,
            reason: "not running".to_string(),
        },
        code => RegistryError::Os { operation, code },
    }
}

fn open_manager(access: u32, operation: &'static str, service: &str) -> Result<ScHandle, RegistryError> {
    // SAFETY: null machine and database select the local active database.
    let handle = unsafe { OpenSCManagerW(ptr::null(), ptr::null(), access) };
    if handle.is_null() {
        return Err(map_error(operation, service, last_error()));
    }
    Ok(ScHandle(handle))
}

fn open_service(
    manager: &ScHandle,
    name: &str,
    access: u32,
    operation: &'static str,
) -> Result<ScHandle, RegistryError> {
    let wide = to_wide(name);
    // SAFETY: `wide` is NUL-terminated and outlives the call.
    let handle = unsafe { OpenServiceW(manager.0, wide.as_ptr(), access) };
    if handle.is_null() {
        return Err(map_error(operation, name, last_error()));
    }
    Ok(ScHandle(handle))
}

fn empty_status() -> SERVICE_STATUS {
    SERVICE_STATUS {
        dwServiceType: 0,
        dwCurrentState: 0,
        dwControlsAccepted: 0,
        dwWin32ExitCode: 0,
        dwServiceSpecificExitCode: 0,
        dwCheckPoint: 0,
        dwWaitHint: 0,
    }
}

/// Service Control Manager registry client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScmRegistry;

impl ScmRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ServiceRegistry for ScmRegistry {
    fn is_installed(&self, name: &str) -> bool {
        open_manager(SC_MANAGER_CONNECT, "query", name)
            .and_then(|m| open_service(&m, name, SERVICE_QUERY_CONFIG, "query"))
            .is_ok()
    }

    fn is_running(&self, name: &str) -> Result<bool, RegistryError> {
        let manager = open_manager(SC_MANAGER_CONNECT, "query", name)?;
        let service = match open_service(&manager, name, SERVICE_QUERY_STATUS, "query") {
            Ok(service) => service,
            Err(RegistryError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        let mut status = empty_status();
        // SAFETY: `status` is a valid out pointer.
        if unsafe { QueryServiceStatus(service.0, &mut status) } == 0 {
            return Err(map_error("query", name, last_error()));
        }
        Ok(status.dwCurrentState == ServiceState::Running.to_raw())
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = %definition.name,
            display_name = %definition.display_name,
            binary_path = %definition.binary_path.display(), "install");
        let manager = open_manager(SC_MANAGER_CREATE_SERVICE, "install", &definition.name)?;

        let name = to_wide(&definition.name);
        let display = to_wide(&definition.display_name);
        let binary = to_wide(&definition.binary_path.to_string_lossy());
        // SAFETY: all strings are NUL-terminated; optional arguments are null.
        let handle = unsafe {
            CreateServiceW(
                manager.0,
                name.as_ptr(),
                display.as_ptr(),
                SERVICE_ALL_ACCESS,
                SERVICE_WIN32_OWN_PROCESS,
                SERVICE_AUTO_START,
                SERVICE_ERROR_NORMAL,
                binary.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };
        if handle.is_null() {
            return Err(map_error("install", &definition.name, last_error()));
        }
        let service = ScHandle(handle);

        if !definition.description.is_empty() {
            let mut text = to_wide(&definition.description);
            let info = SERVICE_DESCRIPTIONW {
                lpDescription: text.as_mut_ptr(),
            };
            // SAFETY: `info` and `text` outlive the call.
            let ok = unsafe {
                ChangeServiceConfig2W(
                    service.0,
                    SERVICE_CONFIG_DESCRIPTION,
                    &info as *const SERVICE_DESCRIPTIONW as *const c_void,
                )
            };
            if ok == 0 {
                tracing::warn!(target: TARGET, service = %definition.name, code = last_error(),
                    "description not set");
            }
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "remove");
        let manager = open_manager(SC_MANAGER_ALL_ACCESS, "remove", name)?;
        let service = open_service(&manager, name, SERVICE_STOP | DELETE, "remove")?;

        let mut status = empty_status();
        // SAFETY: `status` is a valid out pointer; failure is ignored.
        unsafe {
            ControlService(service.0, codes::STOP, &mut status);
        }
        // SAFETY: handle opened with DELETE access.
        if unsafe { DeleteService(service.0) } == 0 {
            return Err(map_error("remove", name, last_error()));
        }
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "start");
        let manager = open_manager(SC_MANAGER_CONNECT, "start", name)?;
        let service = open_service(&manager, name, SERVICE_START, "start")?;
        // SAFETY: no start arguments.
        if unsafe { StartServiceW(service.0, 0, ptr::null()) } == 0 {
            return Err(map_error("start", name, last_error()));
        }
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "stop");
        let manager = open_manager(SC_MANAGER_CONNECT, "stop", name)?;
        let service = open_service(&manager, name, SERVICE_STOP, "stop")?;
        let mut status = empty_status();
        // SAFETY: `status` is a valid out pointer.
        if unsafe { ControlService(service.0, codes::STOP, &mut status) } == 0 {
            return Err(map_error("stop", name, last_error()));
        }
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<(), RegistryError> {
        tracing::info!(target: TARGET, service = name, "restart");
        Command::new("cmd.exe")
            .raw_arg(format!(
                "/c net stop \"{name}\" & ping 127.0.0.1 -n 5 > nul & net start \"{name}\""
            ))
            .creation_flags(DETACHED_PROCESS)
            .spawn()
            .map(|_| ())
            .map_err(|e| RegistryError::Os {
                operation: "restart",
                code: e.raw_os_error().unwrap_or(-1) as u32,
            })
    }
}
