//! Bounded message queues between tasks.
//!
//! Every inter-task edge in the controller is one of these. The queue
//! holds both channel ends, which gives the sender side access to the
//! receiver for the drop-oldest overflow policy: position batches are
//! idempotent, so when a consumer cannot drain fast enough the stalest
//! entry is the right one to lose.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::warn;

/// A bounded multi-producer multi-consumer queue.
#[derive(Clone)]
pub struct MessageQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> MessageQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push, evicting the oldest entry if the queue is full.
    ///
    /// Returns `true` if anything was evicted. The first eviction after
    /// a quiet period logs a backpressure warning.
    pub fn push_drop_oldest(&self, item: T) -> bool {
        let mut item = item;
        let mut evicted = false;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if total == 1 || total.is_multiple_of(100) {
                            warn!("queue backpressure: dropped oldest entry ({total} total)");
                        }
                        evicted = true;
                    }
                    item = back;
                }
                // We hold a receiver ourselves, so the channel cannot
                // disconnect while the queue is alive.
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    /// Push, blocking if full. For edges where losing entries is wrong
    /// (configuration, ESTOP).
    pub fn push(&self, item: T) {
        let _ = self.tx.send(item);
    }

    /// Receive with a timeout; `None` on timeout. Workers poll this so
    /// their stop flags get checked at a bounded interval.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Non-blocking receive.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain the queue and return only the newest entry.
    ///
    /// The scheduler uses this to always work with the freshest input
    /// frame and skip any it missed.
    pub fn pop_latest(&self) -> Option<T> {
        let mut latest = None;
        while let Ok(item) = self.rx.try_recv() {
            latest = Some(item);
        }
        latest
    }

    /// Entries currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total entries evicted by the drop-oldest policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let q = MessageQueue::bounded(4);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let q = MessageQueue::bounded(2);
        assert!(!q.push_drop_oldest(1));
        assert!(!q.push_drop_oldest(2));
        assert!(q.push_drop_oldest(3));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.dropped(), 1);
    }

    #[test]
    fn pop_latest_skips_stale_entries() {
        let q = MessageQueue::bounded(8);
        for i in 0..5 {
            q.push(i);
        }
        assert_eq!(q.pop_latest(), Some(4));
        assert!(q.is_empty());
        assert_eq!(q.pop_latest(), None);
    }

    #[test]
    fn pop_timeout_returns_none_when_idle() {
        let q: MessageQueue<u8> = MessageQueue::bounded(1);
        assert_eq!(q.pop_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn clones_share_one_queue() {
        let q = MessageQueue::bounded(4);
        let q2 = q.clone();
        q.push(7);
        assert_eq!(q2.try_pop(), Some(7));
    }
}
