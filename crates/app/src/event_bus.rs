//! In-process event bus backed by a tokio broadcast channel.
//!
//! Hub adapters publish every [`HubEvent`] here; the automation runtime
//! subscribes and feeds them to the apps in publication order.

use std::future::Future;

use tokio::sync::broadcast;

use hearth_domain::error::HearthError;
use hearth_domain::event::HubEvent;

use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: HubEvent) -> impl Future<Output = Result<(), HearthError>> + Send {
        if self.sender.send(event).is_err() {
            tracing::trace!("hub event dropped, no subscriber");
        }
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::event::{NOTIFICATION_ACTION_EVENT, StateChange};

    fn motion_event() -> HubEvent {
        HubEvent::state_changed(StateChange::new(
            "binary_sensor.hall_motion",
            Some("off"),
            Some("on"),
        ))
    }

    #[tokio::test]
    async fn should_deliver_event_to_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();

        let event = motion_event();
        let event_id = event.id;

        bus.publish(event).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event_id);
    }

    #[tokio::test]
    async fn should_deliver_event_to_multiple_subscribers() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = HubEvent::custom(NOTIFICATION_ACTION_EVENT, serde_json::json!({}));
        let event_id = event.id;

        bus.publish(event).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().id, event_id);
        assert_eq!(rx2.recv().await.unwrap().id, event_id);
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        assert!(bus.publish(motion_event()).await.is_ok());
    }

    #[tokio::test]
    async fn should_preserve_publication_order() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();

        let first = motion_event();
        let second = motion_event();
        let ids = [first.id, second.id];
        bus.publish(first).await.unwrap();
        bus.publish(second).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().id, ids[0]);
        assert_eq!(rx.recv().await.unwrap().id, ids[1]);
    }
}
