//! # Event subscribers for the service host.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and built-in implementations for handling host events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ControlDispatcher / StatusActor / LifecycleRunner
//!        └── publish(Event) ──► Bus ──► host listener ──► SubscriberSet::emit(&Event)
//!                                                              │
//!                                                    ┌─────────┼──────────┐
//!                                                    ▼         ▼          ▼
//!                                                LogWriter  StatusJournal  Custom
//! ```

mod embedded;
mod set;
mod subscriber;

pub use embedded::{JournalEntry, LogWriter, StatusJournal};
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
