//! Reclamation notifications
//!
//! Host classes and objects announce their own destruction to every queue
//! that asked to watch them. Weak caches drain these queues the way a
//! managed host drains reference queues: an id arriving on the queue means
//! the keyed object is gone and its entry can be purged.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for queue identities
static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Receiving end of reclamation notifications
pub struct ReclaimQueue {
    id: u64,
    tx: Sender<u64>,
    rx: Receiver<u64>,
}

impl ReclaimQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            tx,
            rx,
        }
    }

    /// Unique queue identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask to be notified when the owner of `hooks` is dropped.
    ///
    /// Watching the same owner twice registers a single notification.
    pub fn watch(&self, hooks: &ReclaimHooks) {
        hooks.register(self.id, self.tx.clone());
    }

    /// Take every pending notification without blocking
    pub fn poll(&self) -> Vec<u64> {
        self.rx.try_iter().collect()
    }

    /// Check whether notifications are waiting
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Default for ReclaimQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReclaimQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("id", &self.id)
            .field("pending", &self.rx.len())
            .finish()
    }
}

/// Watchers attached to a reclaimable host object
#[derive(Default)]
pub struct ReclaimHooks {
    watchers: Mutex<Vec<(u64, Sender<u64>)>>,
}

impl ReclaimHooks {
    /// Create hooks with no watchers
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, queue_id: u64, tx: Sender<u64>) {
        let mut watchers = self.watchers.lock();
        if !watchers.iter().any(|(id, _)| *id == queue_id) {
            watchers.push((queue_id, tx));
        }
    }

    /// Number of queues watching the owner
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Notify every watcher that `key` was reclaimed. Called from the owner's `Drop`.
    pub fn fire(&mut self, key: u64) {
        for (_, tx) in self.watchers.get_mut().drain(..) {
            // Receiver may already be gone; nothing left to notify then.
            let _ = tx.send(key);
        }
    }
}

impl std::fmt::Debug for ReclaimHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimHooks")
            .field("watchers", &self.watcher_count())
            .finish()
    }
}
