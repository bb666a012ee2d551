//! Join/exit notifier
//!
//! Registry of threads blocked waiting for some pid to exit. Several
//! threads may watch the same pid; when it exits, every matching
//! registration is resolved with the same exit code and the waiters are
//! handed back to the caller for requeueing. Registrations naming other
//! pids stay pending.
//!
//! Mutators assume preemption is already off.

use std::collections::BTreeMap;
use std::sync::Arc;

use spin::Mutex;

use super::Pid;
use crate::sched::thread::Thread;

/// Watched-pid to waiting-threads multimap.
pub struct JoinRegistry {
    waiters: BTreeMap<Pid, Vec<Arc<Thread>>>,
}

impl JoinRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            waiters: BTreeMap::new(),
        }
    }

    /// Register `thread` as waiting for `watched` to exit.
    pub fn register(&mut self, thread: Arc<Thread>, watched: Pid) {
        log::trace!(
            "[PROCESS] thread {} waiting on exit of pid {}",
            thread.id(),
            watched
        );
        self.waiters.entry(watched).or_default().push(thread);
    }

    /// Resolve the exit of `watched` with `code`.
    ///
    /// Delivers `code` to every waiter's result slot and returns them, in
    /// registration order, for the exit path to move to Ready.
    pub fn resolve(&mut self, watched: Pid, code: i32) -> Vec<Arc<Thread>> {
        let woken = self.waiters.remove(&watched).unwrap_or_default();
        for waiter in &woken {
            waiter.deliver_result(code);
        }
        woken
    }

    /// Number of pending registrations across all watched pids.
    pub fn pending(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }
}

impl Default for JoinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global join registry instance
static JOIN_REGISTRY: Mutex<JoinRegistry> = Mutex::new(JoinRegistry::new());

/// Register a waiter in the global registry.
pub(crate) fn register_waiter(thread: Arc<Thread>, watched: Pid) {
    JOIN_REGISTRY.lock().register(thread, watched);
}

/// Resolve an exit against the global registry.
pub(crate) fn resolve_exit(pid: Pid, code: i32) -> Vec<Arc<Thread>> {
    JOIN_REGISTRY.lock().resolve(pid, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiter(pid: u32) -> Arc<Thread> {
        Thread::new(Pid(pid), Some(Pid(1)), "waiter")
    }

    #[test]
    fn test_resolve_wakes_all_matching_waiters() {
        let mut registry = JoinRegistry::new();
        let first = waiter(20);
        let second = waiter(21);

        registry.register(first.clone(), Pid(7));
        registry.register(second.clone(), Pid(7));
        assert_eq!(registry.pending(), 2);

        let woken = registry.resolve(Pid(7), 42);
        assert_eq!(woken.len(), 2);
        assert_eq!(woken[0].id(), first.id());
        assert_eq!(woken[1].id(), second.id());

        // Both observed the identical exit code.
        assert_eq!(first.take_result(), Some(42));
        assert_eq!(second.take_result(), Some(42));
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_resolve_leaves_other_registrations_pending() {
        let mut registry = JoinRegistry::new();
        let on_seven = waiter(22);
        let on_nine = waiter(23);

        registry.register(on_seven.clone(), Pid(7));
        registry.register(on_nine.clone(), Pid(9));

        let woken = registry.resolve(Pid(7), 0);
        assert_eq!(woken.len(), 1);
        assert_eq!(woken[0].id(), on_seven.id());

        // The waiter on pid 9 is untouched and undelivered.
        assert_eq!(registry.pending(), 1);
        assert_eq!(on_nine.take_result(), None);
    }

    #[test]
    fn test_resolve_without_waiters_is_empty() {
        let mut registry = JoinRegistry::new();
        assert!(registry.resolve(Pid(3), 1).is_empty());
    }
}
