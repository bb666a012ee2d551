//! Preemption level control
//!
//! The kernel runs on a single logical processor, so mutual exclusion over
//! scheduler state is achieved by turning the interrupt level off for the
//! duration of a critical section. Outward-facing entry points (fork, yield,
//! sleep) disable the level themselves; the dispatcher and the queue
//! mutators assume their caller already did.

use core::sync::atomic::{AtomicU8, Ordering};

use super::context;

/// Hardware interrupt/preemption level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLevel {
    /// Interrupts disabled; the running thread cannot be preempted.
    Off,
    /// Interrupts enabled.
    On,
}

impl IntLevel {
    fn from_u8(v: u8) -> IntLevel {
        if v == 0 {
            IntLevel::Off
        } else {
            IntLevel::On
        }
    }
}

/// Current interrupt level. The kernel boots with interrupts enabled.
static LEVEL: AtomicU8 = AtomicU8::new(1);

/// Set the interrupt level, returning the previous one.
///
/// Idempotent: setting the level it already holds is a no-op.
pub fn set_level(level: IntLevel) -> IntLevel {
    let prev = LEVEL.swap(level as u8, Ordering::SeqCst);
    IntLevel::from_u8(prev)
}

/// Read the current interrupt level.
pub fn level() -> IntLevel {
    IntLevel::from_u8(LEVEL.load(Ordering::SeqCst))
}

/// Halt if interrupts are not already off.
///
/// Calling a dispatcher or queue mutator with interrupts enabled is a
/// programming-model violation, not a recoverable error.
pub(crate) fn expect_disabled(op: &'static str) {
    if level() != IntLevel::Off {
        panic!("[MACHINE] {op} called with interrupts enabled");
    }
}

/// RAII guard that disables interrupts and restores the previous level on
/// drop.
///
/// A thread being retired unwinds through any guards it still holds; the
/// drop is skipped in that case because a different thread is already
/// running and owns the level.
pub struct InterruptGuard {
    prev: IntLevel,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if !context::is_retiring() {
            set_level(self.prev);
        }
    }
}

/// Disable interrupts for the lifetime of the returned guard.
pub fn disable() -> InterruptGuard {
    InterruptGuard {
        prev: set_level(IntLevel::Off),
    }
}
