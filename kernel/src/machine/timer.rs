//! Discrete tick source
//!
//! The kernel measures time in ticks. [`tick`] is the periodic interrupt:
//! it advances the counter by one, charges the instruction to the running
//! thread, and wakes any timed sleeper whose deadline has arrived. When
//! every thread is blocked, the dispatcher fast-forwards the counter to the
//! next pending deadline via [`advance_to`] instead of spinning.

use core::sync::atomic::{AtomicU64, Ordering};

use super::interrupt;

static TOTAL_TICKS: AtomicU64 = AtomicU64::new(0);

/// Total ticks elapsed since boot.
pub fn total_ticks() -> u64 {
    TOTAL_TICKS.load(Ordering::SeqCst)
}

/// Advance time by one tick and run the wake check.
pub fn tick() {
    let _guard = interrupt::disable();

    let now = TOTAL_TICKS.fetch_add(1, Ordering::SeqCst) + 1;

    if let Some(current) = crate::sched::try_current() {
        current.stats.charge_instructions(1);
    }

    crate::sched::wake_due_sleepers(now);
}

/// Fast-forward time to `tick` without running the wake check.
///
/// Used by the dispatcher's idle path, which performs its own wake pass.
/// Time never moves backwards.
pub(crate) fn advance_to(tick: u64) {
    TOTAL_TICKS.fetch_max(tick, Ordering::SeqCst);
}
