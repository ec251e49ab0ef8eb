//! In-process event bus backed by a `tokio::sync::broadcast` channel.

use callsync_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event names emitted by the engine.
pub mod names {
    pub const CAMPAIGN_CREATED: &str = "campaign.created";
    pub const CAMPAIGN_UPDATED: &str = "campaign.updated";
    pub const CALL_LINE_CREATED: &str = "call_line.created";
    pub const CALL_LINE_UPDATED: &str = "call_line.updated";
    pub const INCOMING_CALL_CREATED: &str = "incoming_call.created";
    pub const INCOMING_CALL_UPDATED: &str = "incoming_call.updated";
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// A change to a synchronized record.
///
/// Constructed via [`DomainEvent::new`] and enriched with
/// [`with_entity`](DomainEvent::with_entity),
/// [`with_user`](DomainEvent::with_user) and
/// [`with_payload`](DomainEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-separated event name, e.g. `"campaign.created"`.
    pub name: String,

    /// Entity kind (`"campaign"`, `"call_line"`, `"incoming_call"`).
    pub entity_type: Option<String>,

    pub entity_id: Option<DbId>,

    /// Owner of the record, when it has one.
    pub user_id: Option<DbId>,

    /// The full record as JSON.
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl DomainEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: None,
            entity_id: None,
            user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_user(mut self, user_id: DbId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Serialize `record` as the payload. A record that fails to serialize
    /// leaves the payload empty; events are informational only.
    pub fn with_record<T: Serialize>(mut self, record: &T) -> Self {
        match serde_json::to_value(record) {
            Ok(value) => self.payload = value,
            Err(e) => tracing::warn!(event = %self.name, error = %e, "Event payload not serializable"),
        }
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Publish capability handed to the engine. Transport is up to the
/// implementation; publishing never fails from the caller's point of view.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`DomainEvent`].
///
/// ```rust
/// use callsync_events::{DomainEvent, EventBus, EventSink};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DomainEvent::new("campaign.created"));
/// assert_eq!(rx.try_recv().unwrap().name, "campaign.created");
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DomainEvent) {
        // A SendError only means there are zero receivers.
        if self.sender.send(event).is_err() {
            tracing::trace!("Event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Widget {
        id: i64,
        label: &'static str,
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            DomainEvent::new(names::CAMPAIGN_CREATED)
                .with_entity("campaign", 42)
                .with_user(7)
                .with_record(&Widget { id: 42, label: "x" }),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.name, "campaign.created");
        assert_eq!(received.entity_type.as_deref(), Some("campaign"));
        assert_eq!(received.entity_id, Some(42));
        assert_eq!(received.user_id, Some(7));
        assert_eq!(received.payload["label"], "x");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(DomainEvent::new(names::CALL_LINE_UPDATED));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.name, "call_line.updated");
        assert_eq!(e2.name, "call_line.updated");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(DomainEvent::new("orphan.event"));
    }

    #[test]
    fn sink_is_object_safe() {
        let sink: std::sync::Arc<dyn EventSink> = std::sync::Arc::new(EventBus::new(4));
        sink.publish(DomainEvent::new(names::INCOMING_CALL_CREATED));
    }

    #[test]
    fn default_event_has_empty_optional_fields() {
        let event = DomainEvent::new("bare.event");
        assert!(event.entity_type.is_none());
        assert!(event.entity_id.is_none());
        assert!(event.user_id.is_none());
        assert!(event.payload.is_object());
    }
}
