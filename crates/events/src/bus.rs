//! In-process topic bus backed by a `tokio::sync::broadcast` channel.
//!
//! Every subscriber sees every message and filters on [`BusMessage::topic`].
//! The bus is shared via `Arc<EventBus>` between the dispatcher (producer),
//! the synchronizer and the realtime hub (consumers).

use async_trait::async_trait;
use quill_core::envelope::EventEnvelope;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// One published envelope and the topic it was published on.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub envelope: EventEnvelope,
}

/// A publish that the transport did not accept.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("message rejected on topic '{topic}': {reason}")]
    Rejected { topic: String, reason: String },
}

/// Outbound side of the message bus.
///
/// `Ok` means the transport took ownership of the message; the dispatcher
/// marks the outbox row only after that.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError>;
}

/// In-process fan-out bus.
pub struct EventBus {
    sender: broadcast::Sender<BusMessage>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send to all current subscribers. Returns how many received it.
    pub fn send(&self, topic: &str, envelope: EventEnvelope) -> usize {
        // Zero receivers is the only failure mode of broadcast::send.
        self.sender
            .send(BusMessage {
                topic: topic.to_string(),
                envelope,
            })
            .unwrap_or(0)
    }

    /// Subscribe to every topic.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Publisher for EventBus {
    /// In-process delivery cannot fail; a message with no subscribers is
    /// accepted and dropped, like a topic nobody listens on.
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let receivers = self.send(topic, envelope.clone());
        tracing::trace!(topic, receivers, event_id = %envelope.event_id, "Published to bus");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use quill_core::types::new_id;
    use serde_json::json;

    use super::*;

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope {
            event_id: new_id(),
            timestamp: Utc::now(),
            entity: "note".to_string(),
            event_type: event_type.to_string(),
            actor_id: None,
            data: json!({}),
            note_id: None,
            notebook_id: None,
            block_id: None,
            task_id: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_message() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish("note", &envelope("note.created")).await.unwrap();

        let m1 = rx1.recv().await.expect("subscriber 1 should receive");
        let m2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(m1.topic, "note");
        assert_eq!(m2.envelope.event_type, "note.created");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_accepted() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.publish("note", &envelope("note.created")).await.is_ok());
    }
}
