//! Processing-state events and the document-scoped event bus.
//!
//! The worker publishes every task status change here. Subscribers either
//! take the whole stream ([`EventBus::subscribe`]) or only the events of one
//! document ([`EventBus::subscribe_document`]), which is how a UI shows
//! queued/processing/completed/failed without polling.
//!
//! Delivery is at-least-once from the consumer's point of view: a retried
//! document produces a second terminal event, so consumers must treat a
//! repeated terminal state as a no-op.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned wrapper around a [`ServerEvent`].
///
/// `event_type` is dot-namespaced (e.g. `"task.started"`). `payload_version`
/// starts at 1 and increments on breaking payload changes.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// `"task"` or `"document"`; absent for queue-wide events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Document the event concerns, used for subscription filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    pub payload_version: u32,
    pub payload: ServerEvent,
}

impl EventEnvelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            entity_type: event.entity_type().map(String::from),
            entity_id: event.entity_id().map(|id| id.to_string()),
            document_id: event.document_id(),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Server Event (domain payloads)
// ============================================================================

/// Processing-state change, serialized with a `type` tag:
/// `{"type":"TaskStarted","task_id":"...","document_id":"...","task_kind":"document_analysis"}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Periodic queue statistics.
    QueueStatus {
        queued: i64,
        processing: i64,
        failed: i64,
    },
    TaskQueued {
        task_id: Uuid,
        document_id: Uuid,
        task_kind: String,
    },
    TaskStarted {
        task_id: Uuid,
        document_id: Uuid,
        task_kind: String,
    },
    TaskCompleted {
        task_id: Uuid,
        document_id: Uuid,
        task_kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
    },
    /// `error` is the sanitized, user-facing reason.
    TaskFailed {
        task_id: Uuid,
        document_id: Uuid,
        task_kind: String,
        error: String,
    },
    /// The document's ciphertext and metadata are durable.
    DocumentEncrypted { document_id: Uuid, case_id: Uuid },
}

impl ServerEvent {
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            ServerEvent::QueueStatus { .. } => "queue.status",
            ServerEvent::TaskQueued { .. } => "task.queued",
            ServerEvent::TaskStarted { .. } => "task.started",
            ServerEvent::TaskCompleted { .. } => "task.completed",
            ServerEvent::TaskFailed { .. } => "task.failed",
            ServerEvent::DocumentEncrypted { .. } => "document.encrypted",
        }
    }

    pub fn entity_type(&self) -> Option<&'static str> {
        match self {
            ServerEvent::QueueStatus { .. } => None,
            ServerEvent::TaskQueued { .. }
            | ServerEvent::TaskStarted { .. }
            | ServerEvent::TaskCompleted { .. }
            | ServerEvent::TaskFailed { .. } => Some("task"),
            ServerEvent::DocumentEncrypted { .. } => Some("document"),
        }
    }

    pub fn entity_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::QueueStatus { .. } => None,
            ServerEvent::TaskQueued { task_id, .. }
            | ServerEvent::TaskStarted { task_id, .. }
            | ServerEvent::TaskCompleted { task_id, .. }
            | ServerEvent::TaskFailed { task_id, .. } => Some(*task_id),
            ServerEvent::DocumentEncrypted { document_id, .. } => Some(*document_id),
        }
    }

    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            ServerEvent::QueueStatus { .. } => None,
            ServerEvent::TaskQueued { document_id, .. }
            | ServerEvent::TaskStarted { document_id, .. }
            | ServerEvent::TaskCompleted { document_id, .. }
            | ServerEvent::TaskFailed { document_id, .. }
            | ServerEvent::DocumentEncrypted { document_id, .. } => Some(*document_id),
        }
    }

    /// True for `task.completed` and `task.failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::TaskCompleted { .. } | ServerEvent::TaskFailed { .. }
        )
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus.
///
/// Slow receivers that fall behind the buffer lose the oldest events.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: ServerEvent) {
        let envelope = EventEnvelope::new(event);
        debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Subscribe to the events of a single document.
    pub fn subscribe_document(&self, document_id: Uuid) -> DocumentSubscription {
        DocumentSubscription {
            document_id,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// What a [`DocumentSubscription`] yields.
#[derive(Debug, Clone)]
pub enum DocumentUpdate {
    /// An event for the subscribed document.
    Event(EventEnvelope),
    /// The receiver fell behind and `skipped` events were lost, possibly
    /// including this document's terminal event. Reload the document's
    /// tasks from the repository before trusting later events.
    Lagged { skipped: u64 },
}

impl DocumentUpdate {
    pub fn into_event(self) -> Option<EventEnvelope> {
        match self {
            DocumentUpdate::Event(envelope) => Some(envelope),
            DocumentUpdate::Lagged { .. } => None,
        }
    }
}

/// A receiver filtered to one document.
pub struct DocumentSubscription {
    document_id: Uuid,
    rx: broadcast::Receiver<EventEnvelope>,
}

impl DocumentSubscription {
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Next update for this document, or `None` once the bus is dropped.
    ///
    /// Lost events are never skipped silently: a lag surfaces as
    /// [`DocumentUpdate::Lagged`] so the subscriber can resynchronize.
    pub async fn recv(&mut self) -> Option<DocumentUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.document_id == Some(self.document_id) => {
                    return Some(DocumentUpdate::Event(envelope))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        document_id = %self.document_id,
                        skipped,
                        "Document subscription lagged, resync required"
                    );
                    return Some(DocumentUpdate::Lagged { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event for this document, treating a lag as an error.
    pub async fn recv_event(&mut self) -> crate::Result<Option<EventEnvelope>> {
        match self.recv().await {
            Some(DocumentUpdate::Event(envelope)) => Ok(Some(envelope)),
            Some(DocumentUpdate::Lagged { skipped }) => Err(crate::Error::Internal(format!(
                "document subscription lagged by {} events",
                skipped
            ))),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(document_id: Uuid) -> ServerEvent {
        ServerEvent::TaskStarted {
            task_id: Uuid::new_v4(),
            document_id,
            task_kind: "document_analysis".to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(ServerEvent::QueueStatus {
            queued: 4,
            processing: 1,
            failed: 0,
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "queue.status");
        assert_eq!(envelope.payload_version, 1);
        assert!(envelope.entity_type.is_none());
        assert!(envelope.document_id.is_none());
    }

    #[tokio::test]
    async fn test_event_bus_no_subscribers_ok() {
        let bus = EventBus::new(32);
        bus.emit(started(Uuid::new_v4()));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_document_filters_other_documents() {
        let bus = EventBus::new(32);
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut sub = bus.subscribe_document(mine);

        bus.emit(started(other));
        bus.emit(ServerEvent::QueueStatus {
            queued: 0,
            processing: 0,
            failed: 0,
        });
        bus.emit(started(mine));

        let envelope = sub.recv_event().await.unwrap().unwrap();
        assert_eq!(envelope.document_id, Some(mine));
        assert_eq!(envelope.event_type, "task.started");
        assert_eq!(envelope.entity_type.as_deref(), Some("task"));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_bus_dropped() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_document(Uuid::new_v4());
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_reports_lag_then_continues() {
        let bus = EventBus::new(2);
        let doc = Uuid::new_v4();
        let mut sub = bus.subscribe_document(doc);

        for _ in 0..8 {
            bus.emit(started(Uuid::new_v4()));
        }
        bus.emit(ServerEvent::DocumentEncrypted {
            document_id: doc,
            case_id: Uuid::new_v4(),
        });

        match sub.recv().await.unwrap() {
            DocumentUpdate::Lagged { skipped } => assert!(skipped > 0),
            other => panic!("expected lag, got {other:?}"),
        }
        let envelope = sub.recv().await.unwrap().into_event().unwrap();
        assert_eq!(envelope.event_type, "document.encrypted");
    }

    #[tokio::test]
    async fn test_terminal_event_lost_to_lag_is_signalled() {
        let bus = EventBus::new(2);
        let doc = Uuid::new_v4();
        let mut sub = bus.subscribe_document(doc);

        bus.emit(ServerEvent::TaskCompleted {
            task_id: Uuid::new_v4(),
            document_id: doc,
            task_kind: "document_analysis".to_string(),
            duration_ms: Some(12),
        });
        for _ in 0..3 {
            bus.emit(started(Uuid::new_v4()));
        }

        let update = tokio::time::timeout(std::time::Duration::from_millis(200), sub.recv())
            .await
            .expect("subscriber must be told about the lost terminal event")
            .unwrap();
        assert!(matches!(update, DocumentUpdate::Lagged { .. }));
    }

    #[tokio::test]
    async fn test_recv_event_errors_on_lag() {
        let bus = EventBus::new(1);
        let doc = Uuid::new_v4();
        let mut sub = bus.subscribe_document(doc);
        bus.emit(started(doc));
        bus.emit(started(doc));

        assert!(matches!(sub.recv_event().await, Err(crate::Error::Internal(_))));
        let envelope = sub.recv_event().await.unwrap().unwrap();
        assert_eq!(envelope.document_id, Some(doc));
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = ServerEvent::TaskFailed {
            task_id: Uuid::nil(),
            document_id: Uuid::nil(),
            task_kind: "document_analysis".into(),
            error: "Document storage is temporarily unavailable".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TaskFailed");
        assert!(event.is_terminal());
        assert!(!started(Uuid::nil()).is_terminal());
    }
}
