//! Opaque context-switch primitive
//!
//! [`switch`] transfers control from the current thread's context to the
//! next one and returns only when some later switch resumes the original
//! context. The dispatcher treats this as a single atomic operation; how it
//! is carried out is a machine-layer detail.
//!
//! In this simulated machine each kernel thread is carried by a host OS
//! thread, and a context is a parking baton: resuming a context grants it a
//! permit, suspending waits for one. The permit protocol guarantees that a
//! resume arriving before the target has parked is not lost, which is
//! exactly the window a hardware switch closes by construction. This is the
//! one place in the kernel where a blocking host primitive is allowed; no
//! scheduler data structure is ever guarded by one.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// How a suspended context came back to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumption {
    /// A later switch handed control back; execution continues normally.
    Resumed,
    /// The thread was destroyed while suspended. Its carrier must unwind
    /// without touching kernel state again.
    Retired,
}

struct BatonState {
    permits: u32,
    retired: bool,
}

struct Baton {
    state: Mutex<BatonState>,
    resumed: Condvar,
}

impl Baton {
    fn lock(&self) -> MutexGuard<'_, BatonState> {
        // Carrier threads never panic while holding the baton lock; recover
        // from poisoning rather than double-panicking during unwinds.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one thread's saved execution context.
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct SwitchContext {
    baton: Arc<Baton>,
}

impl SwitchContext {
    /// Create a fresh, suspended context.
    pub fn new() -> Self {
        Self {
            baton: Arc::new(Baton {
                state: Mutex::new(BatonState {
                    permits: 0,
                    retired: false,
                }),
                resumed: Condvar::new(),
            }),
        }
    }

    /// Grant this context a run permit, waking its carrier if parked.
    fn resume(&self) {
        let mut state = self.baton.lock();
        state.permits += 1;
        self.baton.resumed.notify_one();
    }

    /// Suspend until resumed or retired.
    pub(crate) fn wait(&self) -> Resumption {
        let mut state = self.baton.lock();
        loop {
            if state.retired {
                return Resumption::Retired;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Resumption::Resumed;
            }
            state = self
                .baton
                .resumed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Mark this context destroyed. Its carrier, if suspended, wakes with
    /// [`Resumption::Retired`] and unwinds.
    pub(crate) fn retire(&self) {
        let mut state = self.baton.lock();
        state.retired = true;
        self.baton.resumed.notify_all();
    }
}

impl Default for SwitchContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer control from `current` to `next`.
///
/// Returns when a later switch resumes `current`. A [`Resumption::Retired`]
/// return means `current`'s thread was destroyed while suspended; the
/// caller must immediately retire off the carrier.
pub fn switch(current: &SwitchContext, next: &SwitchContext) -> Resumption {
    next.resume();
    current.wait()
}

// ---------------------------------------------------------------------------
// Carrier retirement
// ---------------------------------------------------------------------------

/// Panic payload used to unwind a retired carrier thread. Never observed
/// outside the thread trampoline.
pub(crate) struct Retired;

thread_local! {
    static RETIRING: Cell<bool> = const { Cell::new(false) };
}

/// True while the calling host thread is unwinding after retirement.
pub(crate) fn is_retiring() -> bool {
    RETIRING.with(Cell::get)
}

/// Unwind the calling carrier thread out of the kernel.
///
/// Destructors run on the way out, but guards check [`is_retiring`] and
/// leave shared machine state alone; by this point a different thread owns
/// it.
pub(crate) fn retire_current() -> ! {
    RETIRING.with(|flag| flag.set(true));
    std::panic::resume_unwind(Box::new(Retired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_resume_before_wait_is_not_lost() {
        let ctx = SwitchContext::new();
        ctx.resume();
        // The permit was granted before anyone parked; wait consumes it
        // without blocking.
        assert_eq!(ctx.wait(), Resumption::Resumed);
    }

    #[test]
    fn test_switch_hands_control_over() {
        let a = SwitchContext::new();
        let b = SwitchContext::new();

        let b2 = b.clone();
        let a2 = a.clone();
        let carrier = thread::spawn(move || {
            assert_eq!(b2.wait(), Resumption::Resumed);
            // Hand control back.
            assert_eq!(switch(&b2, &a2), Resumption::Retired);
        });

        assert_eq!(switch(&a, &b), Resumption::Resumed);
        b.retire();
        carrier.join().unwrap();
    }

    #[test]
    fn test_retire_wakes_parked_carrier() {
        let ctx = SwitchContext::new();
        let ctx2 = ctx.clone();
        let carrier = thread::spawn(move || ctx2.wait());

        thread::sleep(Duration::from_millis(10));
        ctx.retire();
        assert_eq!(carrier.join().unwrap(), Resumption::Retired);
    }
}
