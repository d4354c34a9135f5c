//! # Work Queue
//!
//! A deduplicating queue of controller events:
//!
//! - at most one pending entry per key; a newer entry replaces the pending one
//!   in place, keeping its position
//! - at most one in-flight entry per key; entries added while their key is
//!   being processed are parked and queued again by [`WorkQueue::done`]
//! - retries go through a per-key exponential backoff
//!
//! After [`WorkQueue::shutdown`] pending entries are dropped, new entries are
//! ignored and [`WorkQueue::get`] returns `None`.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::types::{Event, ObjectKey};
use crate::queue::rate_limiter::ItemExponentialBackoff;

/// Something the queue can deduplicate
pub trait QueueItem: Send + Sync + 'static {
    fn queue_key(&self) -> &ObjectKey;
}

impl<T: Send + Sync + 'static> QueueItem for Event<T> {
    fn queue_key(&self) -> &ObjectKey {
        &self.key
    }
}

#[derive(Debug)]
struct QueueState<T> {
    order: VecDeque<ObjectKey>,
    pending: HashMap<ObjectKey, T>,
    processing: HashSet<ObjectKey>,
    parked: HashMap<ObjectKey, T>,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
            pending: HashMap::new(),
            processing: HashSet::new(),
            parked: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct Inner<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    shutdown: CancellationToken,
    limiter: ItemExponentialBackoff,
}

/// Deduplicating, rate limited work queue shared by the workers of one controller
#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: QueueItem> WorkQueue<T> {
    pub fn new(name: impl Into<String>, limiter: ItemExponentialBackoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                shutdown: CancellationToken::new(),
                limiter,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue an item, replacing any pending item with the same key
    pub fn add(&self, item: T) {
        if self.is_shutdown() {
            return;
        }
        let key = item.queue_key().clone();
        let mut state = self.inner.state.lock();

        if state.processing.contains(&key) {
            debug!(queue = %self.inner.name, key = %key, "Key in flight, parking item");
            state.parked.insert(key, item);
            return;
        }

        if state.pending.insert(key.clone(), item).is_none() {
            state.order.push_back(key);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Queue an item once `delay` has elapsed
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(item),
            }
        });
    }

    /// Queue an item after its key's backoff delay
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.inner.limiter.when(item.queue_key());
        debug!(queue = %self.inner.name, key = %item.queue_key(), delay = ?delay, "Requeue with backoff");
        self.add_after(item, delay);
    }

    /// Reset the backoff of a key
    pub fn forget(&self, key: &ObjectKey) {
        self.inner.limiter.forget(key);
    }

    /// Number of rate limited requeues of a key since it was last forgotten
    pub fn num_requeues(&self, key: &ObjectKey) -> u32 {
        self.inner.limiter.num_requeues(key)
    }

    /// Wait for the next item; `None` once the queue is shut down
    ///
    /// The key of the returned item is in flight until [`WorkQueue::done`].
    pub async fn get(&self) -> Option<T> {
        loop {
            if self.is_shutdown() {
                return None;
            }
            {
                let mut state = self.inner.state.lock();
                while let Some(key) = state.order.pop_front() {
                    if let Some(item) = state.pending.remove(&key) {
                        state.processing.insert(key);
                        return Some(item);
                    }
                }
            }
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return None,
                _ = self.inner.notify.notified() => {}
            }
        }
    }

    /// Mark a key as processed, queueing any item parked meanwhile
    pub fn done(&self, key: &ObjectKey) {
        let parked = {
            let mut state = self.inner.state.lock();
            state.processing.remove(key);
            state.parked.remove(key)
        };
        if let Some(item) = parked {
            self.add(item);
        }
    }

    /// Number of pending items
    pub fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the queue, dropping pending items and waking every waiter
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.order.clear();
            state.pending.clear();
            state.parked.clear();
        }
        self.inner.shutdown.cancel();
        debug!(queue = %self.inner.name, "Queue shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}
