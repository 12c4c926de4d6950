//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] an extension point for plugging custom event handlers
//! into the service host (log sinks, metrics, audit trails).
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use servicevisor::{Event, EventKind, Subscribe};
//!
//! struct Transitions;
//!
//! #[async_trait]
//! impl Subscribe for Transitions {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::StatusReported) {
//!             // forward ev.state / ev.checkpoint somewhere
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "transitions" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for host observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order, on the subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
