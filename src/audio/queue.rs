//! Lock-free hand-off queue between the simulation and audio threads
//!
//! Single-producer single-consumer in practice, bounded, never blocks and
//! never allocates after construction. A full queue hands the item back to
//! the producer instead of waiting.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded lock-free queue with overflow accounting
pub struct HandoffQueue<T> {
    queue: ArrayQueue<T>,
    overflow_count: AtomicUsize,
}

impl<T> HandoffQueue<T> {
    /// Create a new queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// Push an item; a full queue returns it to the caller
    pub fn push(&self, item: T) -> Result<(), T> {
        self.queue.push(item).map_err(|item| {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            item
        })
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }
}
