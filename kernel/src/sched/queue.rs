//! Ready queue
//!
//! Strict FIFO of runnable threads: insertion order is scheduling order, no
//! priorities. A thread is in the queue at most once; the lifecycle state
//! machine guarantees it, and pushing a thread that is already `Ready`
//! trips a debug assertion.
//!
//! Mutators assume preemption is already off.

use std::collections::VecDeque;
use std::sync::Arc;

use super::thread::{Thread, ThreadState};

/// FIFO collection of runnable threads.
pub struct ReadyQueue {
    threads: VecDeque<Arc<Thread>>,
}

impl ReadyQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            threads: VecDeque::new(),
        }
    }

    /// Mark `thread` ready and append it.
    pub fn push(&mut self, thread: Arc<Thread>) {
        debug_assert_ne!(
            thread.state(),
            ThreadState::Ready,
            "thread {} enqueued while already ready",
            thread.id()
        );
        log::trace!("[SCHED] thread {} moved to ready queue", thread.id());
        thread.set_state(ThreadState::Ready);
        self.threads.push_back(thread);
    }

    /// Remove and return the next thread to run, if any.
    pub fn pop(&mut self) -> Option<Arc<Thread>> {
        self.threads.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Pid;

    fn thread(pid: u32) -> Arc<Thread> {
        Thread::new(Pid(pid), Some(Pid(1)), "queued")
    }

    #[test]
    fn test_fifo_order_preserved() {
        let mut queue = ReadyQueue::new();
        let ids: Vec<u32> = (30..38).collect();
        for &pid in &ids {
            queue.push(thread(pid));
        }
        assert_eq!(queue.len(), ids.len());

        // Extracted in insertion order, each exactly once, none skipped.
        let extracted: Vec<u32> = core::iter::from_fn(|| queue.pop())
            .map(|t| t.id().0)
            .collect();
        assert_eq!(extracted, ids);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_sets_ready_state() {
        let mut queue = ReadyQueue::new();
        let t = thread(40);
        queue.push(t.clone());
        assert_eq!(t.state(), ThreadState::Ready);
    }

    #[test]
    fn test_pop_empty_returns_none() {
        let mut queue = ReadyQueue::new();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_interleaved_push_pop() {
        let mut queue = ReadyQueue::new();
        queue.push(thread(50));
        queue.push(thread(51));
        assert_eq!(queue.pop().map(|t| t.id().0), Some(50));
        queue.push(thread(52));
        assert_eq!(queue.pop().map(|t| t.id().0), Some(51));
        assert_eq!(queue.pop().map(|t| t.id().0), Some(52));
        assert!(queue.pop().is_none());
    }
}
