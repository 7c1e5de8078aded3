//! Event fan-out to registered listeners.
//!
//! The bus is owned by a channel instance and handed to whoever consumes
//! server events. Registrations are keyed by [`ListenerId`], so adding and
//! removing listeners is idempotent and several chat controllers can
//! coexist without clobbering each other.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use unveil_shared::protocol::ServerEvent;

/// Stable identity of one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Multi-subscriber event bus. Every published event reaches every listener
/// registered at publish time, in arrival order.
#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned receiver yields events in the
    /// order the connection delivered them.
    pub fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ListenerId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(id, tx);
            debug!(listener = %id, total = listeners.len(), "Listener registered");
        }
        (id, rx)
    }

    /// Remove a listener. Removing an unknown or already-removed id is a
    /// no-op; returns whether anything was removed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let removed = listeners.remove(&id).is_some();
        if removed {
            debug!(listener = %id, total = listeners.len(), "Listener removed");
        }
        removed
    }

    /// Deliver an event to every registered listener. Listeners whose
    /// receiver side has been dropped are pruned here.
    pub fn publish(&self, event: &ServerEvent) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                debug!(listener = %id, "Pruning dropped listener");
            }
            alive
        });
    }

    /// Drop every registration. Used when the channel is torn down.
    pub fn clear(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            if !listeners.is_empty() {
                debug!(total = listeners.len(), "Clearing all listeners");
            }
            listeners.clear();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unveil_shared::protocol::{CheckpointReached, VibeCheckUpdate};
    use unveil_shared::types::{MatchId, VibeOutcome};

    fn checkpoint_event(match_id: &str, stage: u8) -> ServerEvent {
        ServerEvent::CheckpointReached(CheckpointReached {
            match_id: MatchId::new(match_id),
            stage,
        })
    }

    #[test]
    fn test_publish_reaches_every_listener_in_order() {
        let bus = EventBus::new();
        let (_id_a, mut rx_a) = bus.subscribe();
        let (_id_b, mut rx_b) = bus.subscribe();

        bus.publish(&checkpoint_event("match_1", 1));
        bus.publish(&checkpoint_event("match_1", 2));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                ServerEvent::CheckpointReached(c) => assert_eq!(c.stage, 1),
                other => panic!("wrong event: {other:?}"),
            }
            match rx.try_recv().unwrap() {
                ServerEvent::CheckpointReached(c) => assert_eq!(c.stage, 2),
                other => panic!("wrong event: {other:?}"),
            }
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe();
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);

        bus.publish(&ServerEvent::VibeCheckUpdate(VibeCheckUpdate {
            match_id: MatchId::new("match_1"),
            outcome: VibeOutcome::Success,
        }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receivers_are_pruned_on_publish() {
        let bus = EventBus::new();
        let (_id_kept, mut rx_kept) = bus.subscribe();
        let (_id_dropped, rx_dropped) = bus.subscribe();
        drop(rx_dropped);
        assert_eq!(bus.listener_count(), 2);

        bus.publish(&checkpoint_event("match_1", 3));

        assert_eq!(bus.listener_count(), 1);
        assert!(rx_kept.try_recv().is_ok());
    }

    #[test]
    fn test_clear_removes_all_listeners() {
        let bus = EventBus::new();
        let (_a, mut rx) = bus.subscribe();
        let (_b, _rx_b) = bus.subscribe();

        bus.clear();
        assert_eq!(bus.listener_count(), 0);

        bus.publish(&checkpoint_event("match_1", 1));
        assert!(rx.try_recv().is_err());
    }
}
