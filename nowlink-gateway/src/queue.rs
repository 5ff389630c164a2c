// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ingress queue
//!
//! Bounded FIFO between the radio receive context (producer) and the
//! forwarding loop (consumer). The producer must never wait, so a full queue
//! drops the incoming record instead of evicting anything already queued.

use nowlink::TelemetryRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded, lossy-on-overflow record queue
///
/// Shared between threads behind an `Arc`; every operation holds the lock
/// only for the duration of a single `VecDeque` call.
#[derive(Debug)]
pub struct IngressQueue {
    records: Mutex<VecDeque<TelemetryRecord>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl IngressQueue {
    /// Create a queue holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TelemetryRecord>> {
        // A panicking holder cannot leave the deque half-updated
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a record; returns `false` and counts a drop when full
    pub fn enqueue(&self, record: TelemetryRecord) -> bool {
        let mut records = self.lock();
        if records.len() >= self.capacity {
            drop(records);
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                device = %record.device_name,
                message_id = record.message_id,
                dropped,
                "ingress queue full, record dropped"
            );
            return false;
        }
        records.push_back(record);
        true
    }

    /// Remove and return the oldest record
    pub fn dequeue(&self) -> Option<TelemetryRecord> {
        self.lock().pop_front()
    }

    /// Copy of the oldest record, left in place
    pub fn peek(&self) -> Option<TelemetryRecord> {
        self.lock().front().cloned()
    }

    /// Check if the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.capacity
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of queued records
    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    /// Maximum number of records
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for IngressQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(id: u32) -> TelemetryRecord {
        TelemetryRecord::new("node").with_message_id(id)
    }

    #[test]
    fn test_fifo_order() {
        let queue = IngressQueue::new(4);
        for id in 1..=3 {
            assert!(queue.enqueue(record(id)));
        }
        assert_eq!(queue.peek().map(|r| r.message_id), Some(1));
        assert_eq!(queue.depth(), 3);

        let ids: Vec<u32> = std::iter::from_fn(|| queue.dequeue())
            .map(|r| r.message_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops_incoming() {
        let queue = IngressQueue::new(2);
        assert!(queue.enqueue(record(1)));
        assert!(queue.enqueue(record(2)));
        assert!(queue.is_full());

        assert!(!queue.enqueue(record(3)));
        assert!(!queue.enqueue(record(4)));
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.depth(), 2);

        // Existing contents were not evicted
        assert_eq!(queue.dequeue().map(|r| r.message_id), Some(1));
        assert_eq!(queue.dequeue().map(|r| r.message_id), Some(2));
    }

    #[test]
    fn test_depth_bounded_under_mixed_operations() {
        let queue = IngressQueue::new(5);
        let mut expected_drops = 0;
        for step in 0..200u32 {
            if step % 3 == 2 {
                queue.dequeue();
            } else {
                let was_full = queue.is_full();
                let accepted = queue.enqueue(record(step));
                assert_eq!(accepted, !was_full);
                if was_full {
                    expected_drops += 1;
                }
            }
            assert!(queue.depth() <= queue.capacity());
        }
        assert_eq!(queue.dropped(), expected_drops);
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(IngressQueue::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..25 {
                        queue.enqueue(record(t * 100 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.depth(), 50);
        assert_eq!(queue.dropped(), 50);
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(IngressQueue::default().capacity(), DEFAULT_CAPACITY);
    }
}
