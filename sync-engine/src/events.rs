//! Lifecycle event fan-out.
//!
//! Each subscriber owns a bounded channel. Publishing walks the current
//! subscribers in subscription order; a subscriber whose buffer stays full
//! for longer than the configured timeout misses that event, and a
//! subscriber whose receiver is gone is dropped. No history is kept.

use dashmap::DashMap;
use dsync_types::SyncEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

struct Subscriber {
    topic: Option<String>,
    tx: mpsc::Sender<SyncEvent>,
}

/// Receiving end of a subscription.
pub struct Subscription {
    rx: mpsc::Receiver<SyncEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        self.rx.try_recv().ok()
    }

    /// Every event delivered so far.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Pub/sub fan-out for [`SyncEvent`]s.
pub struct EventPublisher {
    subscribers: DashMap<u64, Subscriber>,
    next_id: AtomicU64,
    timeout: Duration,
    capacity: usize,
}

impl EventPublisher {
    /// Create a publisher with the given per-subscriber timeout and buffer size.
    pub fn new(timeout: Duration, capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
            timeout,
            capacity: capacity.max(1),
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.add(None)
    }

    /// Receive events of one topic published from now on.
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> Subscription {
        self.add(Some(topic.into()))
    }

    fn add(&self, topic: Option<String>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, Subscriber { topic, tx });
        Subscription { rx }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `event` to every matching subscriber.
    ///
    /// Returns how many subscribers received it.
    pub async fn publish(&self, event: SyncEvent) -> usize {
        let topic = event.topic();

        // Snapshot the senders so no map shard is locked across an await.
        let mut targets: Vec<(u64, mpsc::Sender<SyncEvent>)> = self
            .subscribers
            .iter()
            .filter(|s| s.topic.as_deref().map_or(true, |t| t == topic))
            .map(|s| (*s.key(), s.tx.clone()))
            .collect();
        targets.sort_by_key(|(id, _)| *id);

        let mut delivered = 0;
        for (id, tx) in targets {
            let event = event.clone();
            let sent = match tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(event)) => {
                    match tokio::time::timeout(self.timeout, tx.send(event)).await {
                        Ok(result) => result.map_err(|_| ()),
                        Err(_) => {
                            tracing::debug!(subscriber = id, %topic, "Subscriber too slow, event skipped");
                            continue;
                        }
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(()),
            };

            match sent {
                Ok(()) => delivered += 1,
                Err(()) => {
                    tracing::debug!(subscriber = id, "Subscriber gone, removing");
                    self.subscribers.remove(&id);
                }
            }
        }
        delivered
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 64)
    }
}
