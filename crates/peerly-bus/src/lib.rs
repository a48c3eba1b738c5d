//! Topic-keyed publish/subscribe for live UI updates.
//!
//! This is a change-notification mechanism, not a source of truth: delivery
//! is at-most-once, there is no replay buffer, and a subscriber that misses
//! an event is expected to re-fetch authoritative state from the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::trace;

pub mod topics;

/// Fan-out bus. Cheap to clone; all clones share the same subscriber table.
pub struct EventBus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BusInner<E> {
    topics: HashMap<String, Vec<Entry<E>>>,
    next_id: u64,
}

struct Entry<E> {
    id: u64,
    tx: mpsc::UnboundedSender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                topics: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a subscriber on `topic`. Events emitted after this call are
    /// delivered in emit order; events emitted before it are never seen.
    pub fn subscribe(&self, topic: &str) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .topics
                .entry(topic.to_string())
                .or_default()
                .push(Entry { id, tx });
            id
        };
        trace!(topic, id, "subscribed");
        Subscription {
            topic: topic.to_string(),
            id,
            rx,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber of `topic`, in
    /// subscription order. Subscribers whose receiving end is gone are
    /// pruned here and never affect the others or the caller.
    pub fn emit(&self, topic: &str, event: E) {
        let mut inner = self.lock();
        let Some(entries) = inner.topics.get_mut(topic) else {
            return;
        };
        entries.retain(|entry| entry.tx.send(event.clone()).is_ok());
        if entries.is_empty() {
            inner.topics.remove(topic);
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner<E>> {
        // Subscriber bookkeeping can't leave the table inconsistent, so a
        // poisoned lock is still safe to reuse.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a single topic subscription. Dropping it unsubscribes.
pub struct Subscription<E> {
    topic: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
    bus: Arc<Mutex<BusInner<E>>>,
}

impl<E> Subscription<E> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next event. Returns `None` once unsubscribed with no
    /// events left in the queue.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Take the next event without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving. Equivalent to dropping the subscription, but reads
    /// better at call sites that unsubscribe mid-flow.
    pub fn unsubscribe(self) {}
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        let mut inner = match self.bus.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entries) = inner.topics.get_mut(&self.topic) {
            entries.retain(|entry| entry.id != self.id);
            if entries.is_empty() {
                inner.topics.remove(&self.topic);
            }
        }
        trace!(topic = %self.topic, id = self.id, "unsubscribed");
    }
}
