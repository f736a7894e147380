//! Bounded event queue with a drop-on-full policy.
//!
//! Producers (the agent run) must never wait on a slow consumer. `push`
//! therefore never blocks: when the queue is full or has been closed the
//! item is discarded and counted. Consumers that care about loss can read
//! [`DropQueue::dropped`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

pub struct DropQueue<T> {
    sender: Mutex<Option<mpsc::Sender<T>>>,
    dropped: AtomicU64,
}

impl<T> DropQueue<T> {
    /// Create a queue holding at most `capacity` undelivered items.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender: Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
        };
        (queue, rx)
    }

    /// Enqueue without waiting. Returns `false` if the item was dropped.
    pub fn push(&self, item: T) -> bool {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            self.record_drop("closed");
            return false;
        };
        match sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.record_drop("full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.record_drop("receiver gone");
                false
            }
        }
    }

    /// Stop accepting items. Items already queued stay readable, after which
    /// the receiver observes closure.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Number of items discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, reason: &str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(reason, total, "Event dropped");
    }
}
