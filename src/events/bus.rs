//! # Event bus for broadcasting host events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Publishing is a
//! plain synchronous `send`, so it is safe from the authority's dispatch thread,
//! which never runs inside the tokio runtime.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                      Subscriber (one):
//!   ControlDispatcher (authority thread) ──┐
//!   StatusActor       (runtime)          ──┼──► Bus ──► host listener ──► SubscriberSet
//!   LifecycleRunner   (runtime)          ──┤
//!   ServiceHost       (caller thread)    ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and never fails.
//! - **Bounded capacity**: one ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for host events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::DispatcherExited));
    }

    #[test]
    fn test_receiver_sees_events_after_subscribe() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::WorkloadStarting));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::WorkloadRunning));

        let ev = rx.try_recv().expect("event");
        assert_eq!(ev.kind, EventKind::WorkloadRunning);
        assert!(rx.try_recv().is_err());
    }
}
