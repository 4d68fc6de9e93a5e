//! The in-process bounded, priority-ordered queue backing one CI's bus
//! endpoint (spec.md §4.3).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use ci_core::Message;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Maximum messages a single CI's queue will hold (spec.md §4.3).
pub const MAX_QUEUE_LEN: usize = 100;

/// Maximum datagram payload size (spec.md §4.3 rationale).
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024;

struct Envelope {
    priority: u8,
    seq: u64,
    message: Message,
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Envelope {}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; among equal priority, earlier arrival
        // (smaller seq) first — a max-heap, so reverse seq comparison.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A bounded, priority-ordered FIFO-within-priority queue for one CI.
pub struct Queue {
    heap: Mutex<BinaryHeap<Envelope>>,
    seq: AtomicU64,
    arrived: Notify,
    space_freed: Notify,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            arrived: Notify::new(),
            space_freed: Notify::new(),
        }
    }
}

impl Queue {
    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= MAX_QUEUE_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a message in, provided there is room. Called only by the
    /// reader task once it has confirmed capacity, so this never drops.
    pub fn push(&self, message: Message) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = message.priority;
        self.heap.lock().push(Envelope {
            priority,
            seq,
            message,
        });
        self.arrived.notify_waiters();
    }

    /// Pop the highest-priority, earliest-arrived message, if any.
    pub fn pop(&self) -> Option<Message> {
        let popped = self.heap.lock().pop().map(|e| e.message);
        if popped.is_some() {
            self.space_freed.notify_waiters();
        }
        popped
    }

    pub async fn wait_for_arrival(&self) {
        self.arrived.notified().await;
    }

    pub async fn wait_for_space(&self) {
        self.space_freed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ci_core::Message;

    #[test]
    fn higher_priority_dequeues_first() {
        let q = Queue::default();
        let mut low = Message::chat("a", "b", "low");
        low.priority = 1;
        let mut high = Message::chat("a", "b", "high");
        high.priority = 20;

        q.push(low);
        q.push(high);

        assert_eq!(q.pop().unwrap().content, "high");
        assert_eq!(q.pop().unwrap().content, "low");
    }

    #[test]
    fn equal_priority_is_fifo() {
        let q = Queue::default();
        q.push(Message::chat("a", "b", "first"));
        q.push(Message::chat("a", "b", "second"));

        assert_eq!(q.pop().unwrap().content, "first");
        assert_eq!(q.pop().unwrap().content, "second");
    }
}
