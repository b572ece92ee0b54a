use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation events, one channel per owning user.
pub struct NotifyHub {
    channels: DashMap<UserId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events about a user's reservations. Creates the channel if needed.
    pub fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Deliver to the event's owner. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&event.owner_user_id()) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReservationStatus;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(7);

        let event = Event::ReservationStatusChanged {
            reservation_id: 1,
            room_id: 2,
            owner_user_id: 7,
            status: ReservationStatus::Confirmed,
        };
        hub.send(&event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn events_route_to_owner_only() {
        let hub = NotifyHub::new();
        let mut owner = hub.subscribe(1);
        let mut other = hub.subscribe(2);

        hub.send(&Event::ReservationCancelled {
            reservation_id: 5,
            room_id: 1,
            owner_user_id: 1,
        });

        assert_eq!(owner.recv().await.unwrap().reservation_id(), 5);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber, should not panic
        hub.send(&Event::ReservationSubmitted {
            reservation_id: 1,
            room_id: 1,
            owner_user_id: 42,
        });
        assert_eq!(hub.channel_count(), 0);
    }
}
