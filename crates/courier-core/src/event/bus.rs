//! Fan-out of runtime notifications.
//!
//! Every queue, worker and service holds a clone of the same [`EventBus`].
//! Events are observability only: nothing in the runtime waits on them, and
//! a subscriber that falls more than `capacity` events behind sees
//! `RecvError::Lagged` instead of stalling producers.

use courier_types::event::BotEvent;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl EventBus {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Returns how many subscribers the event reached. Zero is not an error.
    pub fn publish(&self, event: BotEvent) -> usize {
        let name = event.name();
        let reached = self.tx.send(event).unwrap_or(0);
        trace!(event = name, reached, "published event");
        reached
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::RecvError;

    use super::*;

    fn created(id: &str) -> BotEvent {
        BotEvent::UserCreated {
            user_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(created("alice"));
        bus.publish(BotEvent::UserDeleted {
            user_id: "alice".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().name(), "user:create");
        assert_eq!(rx.recv().await.unwrap().name(), "user:delete");
    }

    #[test]
    fn publish_reports_reach_through_clones() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(created("nobody")), 0);

        let producer = bus.clone();
        let _a = bus.subscribe();
        let _b = producer.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(producer.publish(created("ted")), 2);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for id in ["a", "b", "c"] {
            bus.publish(created(id));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap(), created("b"));
    }
}
