//! # servicevisor
//!
//! **Servicevisor** hosts a long-running workload as a background service
//! under an SCM-style control authority.
//!
//! It bridges the authority's control codes (stop, shutdown, interrogate,
//! power/session/time notifications) into deterministic lifecycle transitions
//! of the workload, while keeping the authority informed with status reports
//! and checkpoints, and never blocking the thread the authority calls in on.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        ┌──────────────────────────────────────────────┐
//!        │  Control authority (SCM / MemoryAuthority)   │
//!        └──────┬───────────────────────────▲───────────┘
//!   main(args), │ control codes              │ status records
//!               ▼                            │
//!   ┌───────────────────────┐        ┌───────┴────────┐
//!   │  ControlDispatcher    │──────► │  StatusActor   │ (single owner of
//!   │  (authority thread)   │ report │  checkpoint    │  ServiceStatus)
//!   └──────────┬────────────┘        └───────▲────────┘
//!              │ stop request                │ report / advance / heartbeat
//!              ▼                             │
//!   ┌───────────────────────────────────────┴──────────┐
//!   │  LifecycleRunner (worker task)                    │
//!   │  start() ─► Running ─► run(ctx) ─► stop() ─► Stopped
//!   └──────────────────────────┬───────────────────────┘
//!                              │ publish(Event)
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                  (capacity: HostConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                           host listener
//!                                   ▼
//!                            SubscriberSet
//!                      ┌────────────┼────────────┐
//!                      ▼            ▼            ▼
//!                  LogWriter  StatusJournal    custom
//! ```
//!
//! ### Status sequence
//! ```text
//! StartPending(1) ─► [StartPending(2..) heartbeats] ─► Running(0)
//!   ─► StopPending(1) ─► [StopPending(2..) heartbeats] ─► Stopped(0, exit)
//!
//! start() fails: StartPending(1) ─► Stopped(0, exit = 1)
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Hosting**       | Register with the authority and drive one activation.        | [`ServiceHost`], [`HostConfig`]             |
//! | **Workload**      | Three-phase application contract.                            | [`Workload`], [`WorkloadFn`]                |
//! | **Authority**     | Control authority seam; SCM on Windows, in-memory elsewhere. | [`ControlAuthority`], [`MemoryAuthority`]   |
//! | **Registry**      | Install, remove, start, stop, restart services.              | [`ServiceRegistry`], [`MemoryRegistry`]     |
//! | **Subscriber API**| Hook into control and status events.                         | [`Subscribe`], [`LogWriter`], [`StatusJournal`] |
//! | **Errors**        | Typed errors for the host, workloads and the registry.       | [`ServiceError`], [`WorkloadError`], [`RegistryError`] |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use servicevisor::{HostConfig, LogWriter, ServiceHost, Subscribe, WorkloadError, WorkloadFn};
//!
//! fn main() -> Result<(), servicevisor::ServiceError> {
//!     let workload = WorkloadFn::arc("agent", |ctx: CancellationToken| async move {
//!         while !ctx.is_cancelled() {
//!             tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!         }
//!         Ok::<_, WorkloadError>(())
//!     });
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     #[cfg(windows)]
//!     let authority = Arc::new(servicevisor::ScmAuthority::new());
//!     #[cfg(not(windows))]
//!     let authority = Arc::new(servicevisor::MemoryAuthority::new());
//!
//!     ServiceHost::builder(HostConfig::new("agent"))
//!         .with_subscribers(subs)
//!         .build(authority, workload)?
//!         .run()
//! }
//! ```
mod authority;
mod control;
mod core;
mod error;
mod events;
mod registry;
mod status;
mod subscribers;
mod workload;

// ---- Public re-exports ----

pub use authority::{
    ControlAuthority, ControlHandler, ControlReply, MemoryAuthority, ServiceMain, StatusHandle,
};
pub use control::{
    ControlCommand, EventPayload, PowerEvent, SessionChangeReason, codes, filetime_to_system_time,
};
pub use core::{HostConfig, ServiceHost, ServiceHostBuilder};
pub use error::{RegistryError, ServiceError, WorkloadError};
pub use events::{Bus, Event, EventKind};
pub use registry::{MemoryRegistry, ServiceDefinition, ServiceRegistry};
pub use status::{
    ControlsAccepted, ERROR_SERVICE_SPECIFIC_ERROR, ServiceExitCode, ServiceState, ServiceStatus,
};
pub use subscribers::{JournalEntry, LogWriter, StatusJournal, Subscribe, SubscriberSet};
pub use workload::{Workload, WorkloadFn, WorkloadRef};

#[cfg(windows)]
pub use authority::ScmAuthority;
#[cfg(windows)]
pub use registry::ScmRegistry;
