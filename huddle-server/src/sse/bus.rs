//! Process-wide broadcast bus
//!
//! Fans named events out to every connected client stream. Delivery is
//! fire-and-forget, at-most-once per sink per publish: a closed sink is
//! evicted as a side effect, a full sink misses that one frame, and
//! neither case surfaces to the publisher. There is no buffering or
//! replay for late subscribers; a new client gets state via the
//! snapshot-on-connect path instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-sink frame buffer. A client further behind than this starts
/// missing frames rather than stalling the publisher.
const SINK_BUFFER: usize = 64;

pub type SubscriberId = u64;

/// Registry of live subscriber sinks
pub struct EventBus {
    next_id: AtomicU64,
    sinks: Mutex<HashMap<SubscriberId, mpsc::Sender<Bytes>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new sink; returns its id and the receiving end the
    /// client stream drains.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SINK_BUFFER);
        self.sinks.lock().unwrap().insert(id, tx);
        debug!("Subscriber {} registered", id);
        (id, rx)
    }

    /// Remove a sink. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.sinks.lock().unwrap().remove(&id).is_some() {
            debug!("Subscriber {} removed", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Serialize `payload` once and deliver the frame to every sink.
    ///
    /// Never fails: a serialization error is logged and the publish is
    /// dropped; a broken sink is evicted without affecting the rest.
    pub fn publish(&self, event: &str, payload: &impl Serialize) {
        let Some(frame) = sse_frame(event, payload) else {
            return;
        };
        let mut sinks = self.sinks.lock().unwrap();
        let mut closed = Vec::new();
        for (&id, tx) in sinks.iter() {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Subscriber {} is behind, dropping '{}' frame", id, event);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }
        for id in closed {
            sinks.remove(&id);
            debug!("Subscriber {} closed, removed during publish", id);
        }
    }

    /// Deliver one frame to a single subscriber (snapshot-only traffic).
    pub fn send_to(&self, id: SubscriberId, event: &str, payload: &impl Serialize) {
        let Some(frame) = sse_frame(event, payload) else {
            return;
        };
        let mut sinks = self.sinks.lock().unwrap();
        if let Some(tx) = sinks.get(&id) {
            if tx.try_send(frame).is_err() {
                sinks.remove(&id);
                debug!("Subscriber {} unreachable, removed", id);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Format one SSE frame: `event: <name>\ndata: <json>\n\n`
fn sse_frame(event: &str, payload: &impl Serialize) -> Option<Bytes> {
    match serde_json::to_string(payload) {
        Ok(json) => Some(Bytes::from(format!("event: {}\ndata: {}\n\n", event, json))),
        Err(e) => {
            warn!("Failed to serialize '{}' event payload: {}", event, e);
            None
        }
    }
}

/// Drop guard that deterministically releases a sink when the client
/// stream is dropped (disconnect or server shutdown).
pub struct Subscription {
    bus: Arc<EventBus>,
    id: SubscriberId,
}

impl Subscription {
    pub fn new(bus: Arc<EventBus>, id: SubscriberId) -> Self {
        Self { bus, id }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_delivers_identical_frame_to_all_sinks() {
        let bus = EventBus::new();
        let (_, mut rx1) = bus.subscribe();
        let (_, mut rx2) = bus.subscribe();
        let (_, mut rx3) = bus.subscribe();

        bus.publish("graph", &json!({"nodes": [], "edges": []}));

        let f1 = rx1.recv().await.unwrap();
        let f2 = rx2.recv().await.unwrap();
        let f3 = rx3.recv().await.unwrap();
        assert_eq!(f1, f2);
        assert_eq!(f2, f3);
        assert_eq!(
            f1,
            Bytes::from("event: graph\ndata: {\"edges\":[],\"nodes\":[]}\n\n")
        );
    }

    #[tokio::test]
    async fn closed_sink_is_evicted_without_affecting_others() {
        let bus = EventBus::new();
        let (_, mut rx1) = bus.subscribe();
        let (_, rx2) = bus.subscribe();
        let (_, mut rx3) = bus.subscribe();
        drop(rx2); // simulate a disconnected client

        bus.publish("line", &json!({"text": "hello"}));

        assert!(rx1.recv().await.is_some());
        assert!(rx3.recv().await.is_some());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let (id, _rx) = bus.subscribe();
        bus.unsubscribe(id);
        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_sink_misses_frame_but_stays_subscribed() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.subscribe();

        for i in 0..SINK_BUFFER + 5 {
            bus.publish("count", &json!({"count": i}));
        }
        // still registered after overflow
        assert_eq!(bus.subscriber_count(), 1);
        // buffered frames are the earliest ones, later ones were dropped
        let first = rx.recv().await.unwrap();
        assert_eq!(first, Bytes::from("event: count\ndata: {\"count\":0}\n\n"));
    }

    #[tokio::test]
    async fn send_to_reaches_only_the_target() {
        let bus = EventBus::new();
        let (id1, mut rx1) = bus.subscribe();
        let (_, mut rx2) = bus.subscribe();

        bus.send_to(id1, "recent_lines", &json!([]));

        assert!(rx1.recv().await.is_some());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn subscription_guard_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let (id, _rx) = bus.subscribe();
        {
            let _guard = Subscription::new(bus.clone(), id);
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
