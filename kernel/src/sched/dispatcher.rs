//! Dispatcher: context-switch orchestration
//!
//! Owns the single process-wide "current thread" slot and the slot holding
//! a thread designated for destruction. [`Dispatcher::switch_to`] assumes
//! preemption is already off and never disables it itself, because its
//! structures cannot be guarded by a blocking primitive: a primitive that
//! had to suspend would ask the dispatcher for the next thread and recurse
//! into the very state it was protecting.
//!
//! Destruction is two-phase. A finishing thread cannot free the stack it is
//! executing on; it designates itself and relinquishes the CPU, and the
//! next thread to run frees the carcass in its post-switch step.

use std::sync::Arc;

use spin::Mutex;

use super::thread::{Thread, ThreadState};
use crate::machine::context::{self, Resumption};
use crate::machine::interrupt;
use crate::process::tree;

/// Dispatcher state
pub struct Dispatcher {
    /// Currently running thread. Mutated only while preemption is off.
    current: Mutex<Option<Arc<Thread>>>,
    /// Thread designated for destruction at the next post-switch step.
    pending_reclaim: Mutex<Option<Arc<Thread>>>,
}

impl Dispatcher {
    const fn new() -> Self {
        Self {
            current: Mutex::new(None),
            pending_reclaim: Mutex::new(None),
        }
    }

    /// Currently running thread, if the scheduler has been started.
    pub fn current(&self) -> Option<Arc<Thread>> {
        self.current.lock().clone()
    }

    /// Install the bootstrap thread as current. Startup only.
    pub(crate) fn adopt_bootstrap(&self, thread: Arc<Thread>) {
        let mut current = self.current.lock();
        if current.is_some() {
            panic!("[SCHED] bootstrap thread installed twice");
        }
        *current = Some(thread);
    }

    /// Designate the calling thread for destruction after the next switch.
    pub(crate) fn designate_reclaim(&self, thread: Arc<Thread>) {
        let mut pending = self.pending_reclaim.lock();
        if pending.is_some() {
            // At most one thread can be between finish and reclamation,
            // because the very next switch reaps it.
            panic!("[SCHED] two threads designated for destruction");
        }
        *pending = Some(thread);
    }

    /// Dispatch the CPU to `next`.
    ///
    /// Preemption must already be off. Saves the previous thread's user
    /// state, verifies its stack guard, swaps the current slot, and invokes
    /// the opaque switch primitive. When the previous thread is eventually
    /// resumed, execution continues here with the post-switch step.
    pub(crate) fn switch_to(&self, next: Arc<Thread>) {
        interrupt::expect_disabled("switch_to");

        let previous = match self.current() {
            Some(t) => t,
            None => panic!("[SCHED] switch_to before scheduler start"),
        };

        previous.save_user_state();
        previous.check_overflow();

        log::trace!(
            "[SCHED] switching from thread {} to thread {}",
            previous.id(),
            next.id()
        );

        let previous_ctx = previous.switch_context();
        let next_ctx = next.switch_context();

        next.set_state(ThreadState::Running);
        next.stats.mark_scheduled();
        {
            *self.current.lock() = Some(next);
        }

        match context::switch(&previous_ctx, &next_ctx) {
            // Now running as `previous` again, possibly much later.
            Resumption::Resumed => self.complete_switch(),
            // `previous` was destroyed while suspended; unwind off its
            // carrier without touching kernel state.
            Resumption::Retired => context::retire_current(),
        }
    }

    /// Post-switch step, run by every freshly (re)scheduled thread: reclaim
    /// any thread designated for destruction, then restore the now-current
    /// thread's user state.
    pub(crate) fn complete_switch(&self) {
        self.reclaim_pending();
        if let Some(current) = self.current() {
            current.restore_user_state();
        }
    }

    fn reclaim_pending(&self) {
        let pending = self.pending_reclaim.lock().take();
        let Some(carcass) = pending else { return };

        if let Some(current) = self.current() {
            if current.id() == carcass.id() {
                panic!(
                    "[SCHED] attempt to destroy thread {} while it is current",
                    carcass.id()
                );
            }
        }

        log::debug!(
            "[SCHED] destroying thread {} \"{}\"",
            carcass.id(),
            carcass.name()
        );

        // Free the stack exactly once, release the pid, and retire the
        // saved context so the carrier unwinds.
        carcass.release_stack();
        tree::release(carcass.id());
        carcass.switch_context().retire();
    }
}

/// Global dispatcher instance
pub static DISPATCHER: Dispatcher = Dispatcher::new();
