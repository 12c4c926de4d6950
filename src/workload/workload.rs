//! # Workload abstraction.
//!
//! A [`Workload`] is the application the host drives as a service. The host
//! calls its phases strictly in order:
//!
//! ```text
//! start() ──ok──► run(ctx) ──returns or ctx cancelled──► stop()
//!    │
//!    └─err──► (stop() is never called)
//! ```
//!
//! `run` receives a [`CancellationToken`] that is cancelled when the control
//! authority asks the service to stop. Returning [`WorkloadError::Canceled`]
//! after observing it is a graceful exit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WorkloadError;

/// Shared handle to a workload.
pub type WorkloadRef = Arc<dyn Workload>;

/// # Three-phase hosted application.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use servicevisor::{Workload, WorkloadError};
///
/// struct Poller;
///
/// #[async_trait]
/// impl Workload for Poller {
///     fn name(&self) -> &str { "poller" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), WorkloadError> {
///         ctx.cancelled().await;
///         Err(WorkloadError::Canceled)
///     }
/// }
/// ```
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Stable, human-readable name.
    fn name(&self) -> &str;

    /// Prepares resources. Long starts are covered by checkpoint heartbeats.
    async fn start(&self) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// Main body. Should return promptly once `ctx` is cancelled.
    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkloadError>;

    /// Releases resources. Called at most once, and only after a successful `start`.
    async fn stop(&self) -> Result<(), WorkloadError> {
        Ok(())
    }
}
