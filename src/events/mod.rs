//! Host events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the control dispatcher, the status
//! reporter, the lifecycle runner and the host itself.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ControlDispatcher` (authority thread), `StatusActor`,
//!   `LifecycleRunner`, `ServiceHost`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the host listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
