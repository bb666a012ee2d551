//! Sleep queue for timed sleepers
//!
//! Array-backed binary min-heap of blocked threads keyed by wake tick,
//! bounded by the maximum concurrent-thread count. Equal wake ticks are
//! broken by insertion order, so sleepers with the same deadline wake in
//! the order they went to sleep.
//!
//! `peek_min` returning `None` is the explicit "no sleepers" signal; there
//! is no magic deadline value. Mutators assume preemption is already off.

use std::sync::Arc;

use super::thread::Thread;
use crate::error::{KernelError, KernelResult};
use crate::process::MAX_THREADS;

struct SleepEntry {
    thread: Arc<Thread>,
    wake_tick: u64,
    /// Insertion sequence number; stable tie-break for equal wake ticks.
    seq: u64,
}

impl SleepEntry {
    fn key(&self) -> (u64, u64) {
        (self.wake_tick, self.seq)
    }
}

/// Bounded min-priority queue of (thread, wake tick) pairs.
pub struct SleepQueue {
    heap: Vec<SleepEntry>,
    next_seq: u64,
}

impl SleepQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            heap: Vec::new(),
            next_seq: 0,
        }
    }

    /// Number of sleepers held.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert `thread`, to be woken once the tick counter reaches
    /// `wake_tick`.
    ///
    /// The capacity bound equals the maximum number of threads that can
    /// exist, so overflowing it means the kernel lost track of a sleeper.
    pub fn insert(&mut self, thread: Arc<Thread>, wake_tick: u64) -> KernelResult<()> {
        if self.heap.len() >= MAX_THREADS {
            return Err(KernelError::QueueFull {
                capacity: MAX_THREADS,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(SleepEntry {
            thread,
            wake_tick,
            seq,
        });
        self.sift_up(self.heap.len() - 1);
        Ok(())
    }

    /// Smallest wake tick currently held, or `None` if there are no
    /// sleepers.
    pub fn peek_min(&self) -> Option<u64> {
        self.heap.first().map(|e| e.wake_tick)
    }

    /// Remove and return the thread with the smallest wake tick.
    pub fn extract_min(&mut self) -> Option<Arc<Thread>> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let entry = match self.heap.pop() {
            Some(entry) => entry,
            None => return None,
        };
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(entry.thread)
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].key() < self.heap[parent].key() {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < len && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < len && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
    }
}

impl Default for SleepQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Pid;

    fn sleeper(pid: u32) -> Arc<Thread> {
        Thread::new(Pid(pid), Some(Pid(1)), "sleeper")
    }

    #[test]
    fn test_extract_returns_minimum_wake_tick() {
        let mut queue = SleepQueue::new();
        queue.insert(sleeper(30), 30).unwrap();
        queue.insert(sleeper(10), 10).unwrap();
        queue.insert(sleeper(20), 20).unwrap();

        assert_eq!(queue.peek_min(), Some(10));
        assert_eq!(queue.extract_min().map(|t| t.id().0), Some(10));
        assert_eq!(queue.peek_min(), Some(20));
        assert_eq!(queue.extract_min().map(|t| t.id().0), Some(20));
        assert_eq!(queue.extract_min().map(|t| t.id().0), Some(30));
        assert_eq!(queue.peek_min(), None);
    }

    #[test]
    fn test_heap_invariant_under_interleaving() {
        let mut queue = SleepQueue::new();
        // Insertions interleaved with extractions; each extraction must
        // return the smallest wake tick among those currently held.
        for (pid, tick) in [(60, 50), (61, 40), (62, 60)] {
            queue.insert(sleeper(pid), tick).unwrap();
        }
        assert_eq!(queue.extract_min().map(|t| t.id().0), Some(61));

        queue.insert(sleeper(63), 45).unwrap();
        queue.insert(sleeper(64), 70).unwrap();
        assert_eq!(queue.len(), 4);

        let order: Vec<u32> = core::iter::from_fn(|| queue.extract_min())
            .map(|t| t.id().0)
            .collect();
        assert_eq!(order, vec![63, 60, 62, 64]);
    }

    #[test]
    fn test_equal_wake_ticks_wake_in_insertion_order() {
        let mut queue = SleepQueue::new();
        for pid in [71, 72, 73] {
            queue.insert(sleeper(pid), 5).unwrap();
        }
        queue.insert(sleeper(70), 1).unwrap();

        let order: Vec<u32> = core::iter::from_fn(|| queue.extract_min())
            .map(|t| t.id().0)
            .collect();
        assert_eq!(order, vec![70, 71, 72, 73]);
    }

    #[test]
    fn test_extract_on_empty_returns_none() {
        let mut queue = SleepQueue::new();
        assert!(queue.extract_min().is_none());
        assert_eq!(queue.peek_min(), None);
    }

    #[test]
    fn test_capacity_is_checked() {
        let mut queue = SleepQueue::new();
        for i in 0..MAX_THREADS {
            queue.insert(sleeper(i as u32 + 1), i as u64).unwrap();
        }
        assert_eq!(
            queue.insert(sleeper(200), 0),
            Err(KernelError::QueueFull {
                capacity: MAX_THREADS
            })
        );
    }

    #[test]
    fn test_randomish_sequence_drains_sorted() {
        let mut queue = SleepQueue::new();
        let ticks = [13u64, 2, 99, 45, 7, 61, 22, 8, 90, 3];
        for (i, &t) in ticks.iter().enumerate() {
            queue.insert(sleeper(100 + i as u32), t).unwrap();
        }

        let mut drained = Vec::new();
        while let Some(min) = queue.peek_min() {
            let t = queue.extract_min();
            assert!(t.is_some());
            drained.push(min);
        }
        let mut sorted = ticks.to_vec();
        sorted.sort_unstable();
        assert_eq!(drained, sorted);
    }
}
