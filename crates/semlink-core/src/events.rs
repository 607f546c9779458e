//! Event types and event bus for link-change notifications.
//!
//! The `LinkChanged` event is the sole invalidation signal for externally
//! cached renderings of a source item, so repositories fire it exactly once
//! per accepted insertion and exactly once per status transition — never
//! batched. Batch lifecycle events exist for progress observers (a polling
//! dashboard, a scheduler). Delivery is broadcast/best-effort; the emission
//! itself is the contract.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Terminal outcome of a batch indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Domain events emitted by semlink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkEvent {
    /// The link set for a source item changed (insertion or status
    /// transition). Consumers invalidate cached renderings of that item.
    LinkChanged { source_id: i64 },
    /// A batch indexing run was initialized with this many items to embed.
    IndexingStarted { total: u64 },
    /// One slice finished.
    SliceCompleted { processed: u64, total: u64 },
    /// The run reached a terminal state.
    IndexingFinished { outcome: RunOutcome },
}

impl LinkEvent {
    /// Namespaced event type (e.g. `"link.changed"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            LinkEvent::LinkChanged { .. } => "link.changed",
            LinkEvent::IndexingStarted { .. } => "indexing.started",
            LinkEvent::SliceCompleted { .. } => "indexing.slice_completed",
            LinkEvent::IndexingFinished { .. } => "indexing.finished",
        }
    }
}

/// Versioned wrapper around a [`LinkEvent`] with emission metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type.
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// The domain event.
    pub payload: LinkEvent,
}

impl EventEnvelope {
    fn new(event: LinkEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            payload: event,
        }
    }
}

/// Broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` with a configurable buffer. Slow receivers
/// that fall behind get a `Lagged` error and miss events; freshness matters
/// more than completeness for invalidation signals.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. With no active subscribers the
    /// event is silently dropped.
    pub fn emit(&self, event: LinkEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to enveloped events. Each subscriber gets an independent
    /// stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(LinkEvent::LinkChanged { source_id: 7 });

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(
            envelope.payload,
            LinkEvent::LinkChanged { source_id: 7 }
        ));
        assert_eq!(envelope.event_type, "link.changed");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(LinkEvent::IndexingStarted { total: 42 });

        for rx in [&mut rx1, &mut rx2] {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.event_type, "indexing.started");
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(32);
        // Must not panic or block.
        bus.emit(LinkEvent::IndexingFinished {
            outcome: RunOutcome::Cancelled,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            LinkEvent::SliceCompleted {
                processed: 1,
                total: 2
            }
            .event_type(),
            "indexing.slice_completed"
        );
        assert_eq!(
            LinkEvent::IndexingFinished {
                outcome: RunOutcome::Failed
            }
            .event_type(),
            "indexing.finished"
        );
    }
}
