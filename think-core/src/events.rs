//! In-process pub/sub for memory and conversation change events.
//!
//! Subscribers get a bounded queue; publish iterates a point-in-time
//! snapshot and drops subscribers whose queue is full or closed, so a stalled
//! transport can never wedge the engine.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Queue depth per subscriber before it is considered stalled.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// Kinds of change events emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MemoryCreated,
    MemoryUpdated,
    MemoryDeleted,
    ConversationCreated,
    ConversationUpdated,
    ConversationDeleted,
}

/// A change event. `memory_id` carries the conversation id for conversation
/// events; `data` is an optional entity snapshot or delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub memory_id: i64,
    pub data: Option<serde_json::Value>,
}

impl HubEvent {
    pub fn new(kind: EventKind, memory_id: i64, data: Option<serde_json::Value>) -> Self {
        HubEvent {
            kind,
            memory_id,
            data,
        }
    }

    /// Wire form used by transports: `data: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {payload}\n\n")
    }
}

struct SubscriberSlot {
    id: u64,
    tx: mpsc::Sender<HubEvent>,
}

struct Inner {
    subscribers: Mutex<Vec<SubscriberSlot>>,
    next_id: AtomicU64,
}

/// Simple pub/sub for engine events.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber; the handle unregisters on drop.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(SubscriberSlot { id, tx });
        debug!("Event subscriber {id} registered");
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every live subscriber. Subscribers with a full or
    /// closed queue are dropped.
    pub fn publish(&self, event: HubEvent) {
        let snapshot: Vec<(u64, mpsc::Sender<HubEvent>)> = {
            let subscribers = self.inner.subscribers.lock();
            subscribers.iter().map(|s| (s.id, s.tx.clone())).collect()
        };

        let mut stalled = Vec::new();
        for (id, tx) in snapshot {
            if tx.try_send(event.clone()).is_err() {
                stalled.push(id);
            }
        }

        if !stalled.is_empty() {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.retain(|s| !stalled.contains(&s.id));
            warn!("Dropped {} stalled event subscriber(s)", stalled.len());
        }
    }

    /// Number of live subscribers, for diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// A registered subscriber. Dropping it unregisters from the bus.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<HubEvent>,
    bus: std::sync::Weak<Inner>,
}

impl Subscription {
    /// Receive the next event; `None` when the bus has gone away.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive for drain loops.
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(HubEvent::new(EventKind::MemoryCreated, 1, None));

        assert_eq!(a.recv().await.unwrap().memory_id, 1);
        assert_eq!(b.recv().await.unwrap().memory_id, 1);
    }

    #[tokio::test]
    async fn dropped_subscription_unregisters() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stalled_subscriber_is_dropped() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe();
        for i in 0..(SUBSCRIBER_QUEUE_CAPACITY + 1) {
            bus.publish(HubEvent::new(EventKind::MemoryUpdated, i as i64, None));
        }
        assert_eq!(bus.subscriber_count(), 0);
        // Already-queued events remain readable
        assert!(slow.try_recv().is_some());
    }

    #[test]
    fn sse_serialization_shape() {
        let event = HubEvent::new(
            EventKind::MemoryUpdated,
            7,
            Some(serde_json::json!({"summary": "s"})),
        );
        let sse = event.to_sse();
        assert!(sse.starts_with("data: {"));
        assert!(sse.ends_with("\n\n"));
        assert!(sse.contains("\"type\":\"memory_updated\""));
        assert!(sse.contains("\"memory_id\":7"));
    }
}
