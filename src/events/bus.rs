//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (pool, watchdog,
//! sampler, scheduler).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   TaskPool  ──┐
//!   Watchdog  ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Sampler   ──┤  (broadcast chan)     (in Scheduler)
//!   Scheduler ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
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

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_receivers_subscribed_before() {
        let bus = Bus::new(0);
        let mut early = bus.subscribe();
        bus.publish(Event::new(EventKind::ConfigReloaded));
        let mut late = bus.subscribe();

        let ev = early.recv().await.map(|e| e.kind);
        assert_eq!(ev.ok(), Some(EventKind::ConfigReloaded));
        assert!(late.try_recv().is_err());
    }
}
