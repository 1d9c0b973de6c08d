//! Subscriber multiplexing.
//!
//! Each subscriber owns an unbounded channel; the registry fans every list
//! replacement out to all of them. A subscriber that has gone away is
//! dropped on the next broadcast.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

/// One published list, shared by all subscribers.
pub type Snapshot<T> = Arc<[T]>;

/// Sender for list snapshots.
pub type SnapshotSender<T> = mpsc::UnboundedSender<Snapshot<T>>;

/// Tracks active subscribers of one service.
#[derive(Debug)]
pub struct SubscriberRegistry<T> {
    subscribers: DashMap<u64, SnapshotSender<T>>,
    next_id: AtomicU64,
}

impl<T> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SubscriberRegistry<T> {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber. Returns its ID.
    pub fn register(&self, sender: SnapshotSender<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.insert(id, sender);
        tracing::debug!(subscriber_id = id, "Subscriber registered");
        id
    }

    /// Unregister a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: u64) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = id, "Subscriber unregistered");
        }
        removed
    }

    /// Send a snapshot to every subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn broadcast(&self, snapshot: &Snapshot<T>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            if entry.value().send(Arc::clone(snapshot)).is_ok() {
                delivered += 1;
            } else {
                closed.push(*entry.key());
            }
        }

        for id in closed {
            self.unregister(id);
        }

        tracing::trace!(recipients = delivered, "Broadcast snapshot to subscribers");
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// A live view of a service's list.
///
/// The list current at subscription time is already queued when this is
/// returned; every later replacement is queued exactly once. Dropping the
/// subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Snapshot<T>>,
    registry: Weak<SubscriberRegistry<T>>,
}

impl<T> Subscription<T> {
    /// Register a new subscriber and queue `current` for it.
    pub(crate) fn open(registry: &Arc<SubscriberRegistry<T>>, current: Snapshot<T>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        // Cannot fail: the receiver is alive
        let _ = sender.send(current);
        let id = registry.register(sender);
        Self {
            id,
            receiver,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next list. Returns `None` once the service is gone.
    pub async fn recv(&mut self) -> Option<Snapshot<T>> {
        self.receiver.recv().await
    }

    /// Take the next queued list, if any.
    pub fn try_recv(&mut self) -> Option<Snapshot<T>> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving updates.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}
