//! # Control authority seam.
//!
//! The control authority is the OS component (the Windows Service Control
//! Manager or an in-process stand-in) that launches the service, delivers
//! control codes and receives status records.
//!
//! ```text
//!  ServiceHost::run()
//!     └─► ControlAuthority::run_dispatcher(name, main)      (blocks)
//!            └─► main(args)                                  (authority thread)
//!                  └─► register_handler(name, handler) ─► Box<dyn StatusHandle>
//!                         handler(ControlCommand) ─► ControlReply (authority thread, repeated)
//! ```
//!
//! - [`MemoryAuthority`]: in-process authority for tests and console hosting.
//! - `ScmAuthority` (Windows only): the Service Control Manager via `windows-sys`.

mod memory;
#[cfg(windows)]
mod scm;

use std::sync::Arc;

use crate::control::ControlCommand;
use crate::error::ServiceError;
use crate::status::ServiceStatus;

pub use memory::MemoryAuthority;
#[cfg(windows)]
pub use scm::ScmAuthority;
#[cfg(windows)]
pub(crate) use scm::to_wide;

/// Reply of the control handler.
///
/// `code` is returned to the authority (`0` = `NO_ERROR`); `status` is the
/// record current when the command was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlReply {
    pub code: u32,
    pub status: ServiceStatus,
}

impl ControlReply {
    pub fn ok(status: ServiceStatus) -> Self {
        Self { code: 0, status }
    }
}

/// Control handler invoked on the authority's thread. Must not block.
pub type ControlHandler = Arc<dyn Fn(ControlCommand) -> ControlReply + Send + Sync>;

/// Service main callback, invoked once by the authority with the start arguments.
pub type ServiceMain = Box<dyn FnOnce(Vec<String>) + Send>;

/// Registration handle used to submit status records.
pub trait StatusHandle: Send + Sync + 'static {
    /// Submits one record. Must not block for long.
    fn submit(&self, status: &ServiceStatus) -> Result<(), ServiceError>;
}

/// Control authority protocol.
pub trait ControlAuthority: Send + Sync + 'static {
    /// Connects the calling thread to the authority and blocks until every
    /// service of the process reported `Stopped`.
    ///
    /// Fails with [`ServiceError::RegistrationFailed`] when the authority
    /// refuses the connection.
    fn run_dispatcher(&self, service: &str, main: ServiceMain) -> Result<(), ServiceError>;

    /// Registers the control handler. Called from within the service main callback.
    fn register_handler(
        &self,
        service: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusHandle>, ServiceError>;
}
