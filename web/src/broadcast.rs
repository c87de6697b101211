//! Topic broadcaster for multi-channel live updates.
//!
//! Each topic gets its own `tokio::sync::broadcast` channel, created when
//! the first subscriber joins. Publishing to a topic nobody is subscribed
//! to drops the event on the floor — that is the contract: fire-and-forget
//! with no replay, so late subscribers re-fetch current state instead of
//! reading history.
//!
//! # Architecture
//!
//! ```text
//! QueueService ──publish──> TopicBroadcaster ──channel──> WebSocket clients
//!                               │
//!                               └── one broadcast channel per topic,
//!                                   pruned when the last receiver is gone
//! ```

use cliniq_core::{ChangeNotifier, LiveEvent, Topic};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of each per-topic channel; a client lagging further than this
/// loses events and must re-fetch.
const TOPIC_CHANNEL_CAPACITY: usize = 256;

type ChannelsMap = Arc<RwLock<HashMap<String, broadcast::Sender<(String, LiveEvent)>>>>;

/// Per-topic broadcast fan-out implementing [`ChangeNotifier`].
pub struct TopicBroadcaster {
    /// Map of topic name → broadcast channel
    channels: ChannelsMap,
}

impl TopicBroadcaster {
    /// Create a new topic broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an event to a topic given as a raw routing key.
    ///
    /// Events go only to topics with at least one live receiver; a send
    /// into an empty topic prunes its channel.
    pub async fn publish_to(&self, topic: impl Into<String>, event: LiveEvent) {
        let topic = topic.into();
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&topic) {
            if sender.send((topic.clone(), event)).is_err() {
                debug!(topic = %topic, "last subscriber gone, pruning topic channel");
                channels.remove(&topic);
            }
        }
    }

    /// Subscribe to a topic.
    ///
    /// Returns a receiver that gets every event published to the topic
    /// from this point on.
    pub async fn subscribe(&self, topic: impl Into<String>) -> broadcast::Receiver<(String, LiveEvent)> {
        let topic = topic.into();
        let mut channels = self.channels.write().await;

        let sender = channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0);

        sender.subscribe()
    }

    /// Count of topics with a live channel.
    pub async fn topic_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for TopicBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TopicBroadcaster {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}

impl ChangeNotifier for TopicBroadcaster {
    fn publish(
        &self,
        topic: Topic,
        event: LiveEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.publish_to(topic.to_string(), event).await;
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cliniq_core::{DoctorId, QueueKey};

    fn booked_event(number: u32) -> LiveEvent {
        LiveEvent::TicketBooked {
            queue: QueueKey::new(
                DoctorId::new(),
                NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            ),
            number,
            last_assigned: number,
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let broadcaster = TopicBroadcaster::new();

        let mut rx = broadcaster.subscribe("queue:a").await;
        broadcaster.publish_to("queue:a", booked_event(1)).await;

        let (topic, event) = rx.recv().await.expect("should receive event");
        assert_eq!(topic, "queue:a");
        assert!(matches!(event, LiveEvent::TicketBooked { number: 1, .. }));
    }

    #[tokio::test]
    async fn all_subscribers_receive() {
        let broadcaster = TopicBroadcaster::new();

        let mut rx1 = broadcaster.subscribe("queue:a").await;
        let mut rx2 = broadcaster.subscribe("queue:a").await;

        broadcaster.publish_to("queue:a", booked_event(1)).await;

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let broadcaster = TopicBroadcaster::new();

        let mut rx_a = broadcaster.subscribe("queue:a").await;
        let mut rx_b = broadcaster.subscribe("queue:b").await;

        broadcaster.publish_to("queue:a", booked_event(1)).await;

        assert!(rx_a.recv().await.is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let broadcaster = TopicBroadcaster::new();
        let mut rx = broadcaster.subscribe("queue:a").await;

        for number in 1..=5 {
            broadcaster.publish_to("queue:a", booked_event(number)).await;
        }

        for expected in 1..=5 {
            let (_, event) = rx.recv().await.unwrap();
            let LiveEvent::TicketBooked { number, .. } = event else {
                panic!("unexpected event kind");
            };
            assert_eq!(number, expected);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped_and_pruned() {
        let broadcaster = TopicBroadcaster::new();

        // No channel exists: nothing happens.
        broadcaster.publish_to("queue:a", booked_event(1)).await;
        assert_eq!(broadcaster.topic_count().await, 0);

        // Channel whose only receiver was dropped is pruned on next publish.
        drop(broadcaster.subscribe("queue:b").await);
        assert_eq!(broadcaster.topic_count().await, 1);
        broadcaster.publish_to("queue:b", booked_event(1)).await;
        assert_eq!(broadcaster.topic_count().await, 0);
    }
}
