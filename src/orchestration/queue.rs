//! Priority work queue.
//!
//! Items leave in descending priority; equal priorities leave in insertion
//! order. Items that stay queued keep their position across ticks.

use super::WorkItem;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Queued {
    priority: u8,
    seq: Reverse<u64>,
    item: WorkItem,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.seq).cmp(&(other.priority, other.seq))
    }
}

#[derive(Default)]
pub struct WorkQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: WorkItem) {
        let seq = Reverse(self.next_seq);
        self.next_seq += 1;
        self.heap.push(Queued {
            priority: item.priority,
            seq,
            item,
        });
    }

    /// Highest-priority, oldest item.
    pub fn pop(&mut self) -> Option<WorkItem> {
        self.heap.pop().map(|queued| queued.item)
    }

    /// Removes every item in execution order.
    pub fn drain(&mut self) -> Vec<WorkItem> {
        std::iter::from_fn(|| self.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/queue_tests.rs"]
mod tests;
