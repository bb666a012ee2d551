//! Cooperative scheduler
//!
//! Entry points for the thread lifecycle: [`init`] adopts the caller as the
//! bootstrap thread, [`spawn`] forks a kernel thread, [`yield_cpu`] and
//! [`sleep_ticks`] relinquish the CPU voluntarily, and [`exit_current`]
//! takes a thread through the notify-then-destroy exit path. The CPU is
//! never taken away from a running thread; control moves only at these
//! points.
//!
//! Mutual exclusion over every scheduler structure is the interrupt level:
//! outward-facing entry points disable it on entry, internal helpers assume
//! it is already off. No structure here is guarded by a blocking lock, so
//! the only suspension points are explicit context switches.

pub mod dispatcher;
pub mod queue;
pub mod sleep;
pub mod thread;

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::machine::context::{self, Resumption};
use crate::machine::interrupt::{self, IntLevel};
use crate::machine::registers::{self, RegisterFile};
use crate::machine::timer;
use crate::process::{join, tree, Pid};

use dispatcher::DISPATCHER;
use queue::ReadyQueue;
use sleep::SleepQueue;
use thread::{EntryAction, Thread, ThreadState};

lazy_static! {
    /// Global ready queue instance
    static ref READY_QUEUE: Mutex<ReadyQueue> = Mutex::new(ReadyQueue::new());
}

/// Global sleep queue instance
static SLEEP_QUEUE: Mutex<SleepQueue> = Mutex::new(SleepQueue::new());

/// Start the scheduler by adopting the calling thread as the bootstrap
/// thread.
///
/// Idempotent: a second call logs a warning and changes nothing, so test
/// binaries can share one scheduler instance.
pub fn init(name: &str) {
    let _guard = interrupt::disable();

    if DISPATCHER.current().is_some() {
        log::warn!("[SCHED] scheduler already started, ignoring reinit");
        return;
    }

    let pid = match tree::allocate(None) {
        Ok(pid) => pid,
        Err(err) => panic!("[SCHED] cannot allocate bootstrap pid: {err}"),
    };
    let bootstrap = Thread::bootstrap(pid, name);
    DISPATCHER.adopt_bootstrap(bootstrap);
    log::info!("[SCHED] scheduler started, bootstrap thread {pid} \"{name}\"");
}

/// Currently running thread. Panics if the scheduler has not been started.
pub fn current() -> Arc<Thread> {
    match DISPATCHER.current() {
        Some(thread) => thread,
        None => panic!("[SCHED] no current thread, scheduler not started"),
    }
}

/// Currently running thread, or `None` before [`init`].
pub fn try_current() -> Option<Arc<Thread>> {
    DISPATCHER.current()
}

/// Fork a kernel thread running `entry`.
///
/// The child is created ready; it first runs at the parent's next yield.
/// When `entry` returns, the child exits with code 0.
pub fn spawn(name: &str, entry: impl FnOnce() + Send + 'static) -> Pid {
    spawn_thread(name, EntryAction::Call(Box::new(entry)), None)
}

/// Fork a thread that enters user mode with `regs` when first scheduled.
pub fn spawn_user(name: &str, regs: RegisterFile) -> Pid {
    spawn_thread(name, EntryAction::ResumeUser, Some(regs))
}

fn spawn_thread(name: &str, action: EntryAction, user_regs: Option<RegisterFile>) -> Pid {
    let _guard = interrupt::disable();

    let parent = current().id();
    let pid = match tree::allocate(Some(parent)) {
        Ok(pid) => pid,
        Err(err) => panic!("[SCHED] cannot fork thread \"{name}\": {err}"),
    };

    let child = Thread::new(pid, Some(parent), name);
    if let Some(regs) = user_regs {
        child.attach_user(regs);
    }
    child.set_entry(action);

    start_carrier(child.clone());

    READY_QUEUE.lock().push(child);
    log::debug!("[SCHED] thread {parent} forked thread {pid} \"{name}\"");
    pid
}

/// Start the host thread that carries a kernel thread's execution.
///
/// The carrier parks immediately; the first dispatch to the thread releases
/// it into the trampoline.
fn start_carrier(child: Arc<Thread>) {
    let pid = child.id();
    let ctx = child.switch_context();
    let spawned = std::thread::Builder::new()
        .name(format!("kthread-{pid}"))
        .spawn(move || {
            if ctx.wait() == Resumption::Retired {
                // Destroyed before ever running.
                return;
            }
            run_trampoline(child);
        });
    if let Err(err) = spawned {
        panic!("[SCHED] cannot start carrier for thread {pid}: {err}");
    }
}

/// First code a thread executes: finish the switch that scheduled it, run
/// its entry action, then take the exit path.
///
/// The exit path ends in a retirement unwind rather than a return; it is
/// caught here so the carrier dies quietly. Any other panic is a kernel
/// halt and is re-raised.
fn run_trampoline(child: Arc<Thread>) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        DISPATCHER.complete_switch();
        interrupt::set_level(IntLevel::On);

        match child.take_entry() {
            Some(EntryAction::Call(entry)) => entry(),
            Some(EntryAction::ResumeUser) => registers::run_user(),
            None => {}
        }

        exit_current(0);
    }));

    if let Err(payload) = outcome {
        if !payload.is::<context::Retired>() {
            resume_unwind(payload);
        }
    }
}

/// Relinquish the CPU to the next ready thread.
///
/// If no other thread is ready the call returns immediately; otherwise the
/// caller goes to the back of the ready queue and runs again in FIFO turn.
pub fn yield_cpu() {
    let _guard = interrupt::disable();

    let next = READY_QUEUE.lock().pop();
    let Some(next) = next else {
        return;
    };

    let previous = current();
    log::trace!("[SCHED] thread {} yielding", previous.id());
    READY_QUEUE.lock().push(previous);
    DISPATCHER.switch_to(next);
}

/// Block the calling thread and dispatch the next ready one.
///
/// The caller must already hold the critical section and must have parked
/// itself somewhere a wake authority will find it (sleep queue, join
/// registry), or have arranged its own destruction. Returns when some
/// authority moves the caller back to Ready and it is scheduled again.
pub(crate) fn block_current() {
    interrupt::expect_disabled("block_current");

    let blocked = current();
    blocked.set_state(ThreadState::Blocked);

    let next = loop {
        let popped = READY_QUEUE.lock().pop();
        if let Some(next) = popped {
            break next;
        }
        idle();
    };
    DISPATCHER.switch_to(next);
}

/// Nothing is runnable: fast-forward time to the next sleeper's deadline.
///
/// With no sleepers pending either, no future event can ever make a thread
/// runnable again; that is a deadlock and the kernel halts.
fn idle() {
    interrupt::expect_disabled("idle");

    let next_wake = SLEEP_QUEUE.lock().peek_min();
    match next_wake {
        Some(tick) => {
            log::trace!("[SCHED] idle, advancing time to tick {tick}");
            timer::advance_to(tick);
            wake_due_sleepers(timer::total_ticks());
        }
        None => panic!("[SCHED] no runnable threads and no pending wakeups, system is deadlocked"),
    }
}

/// Put the calling thread to sleep for `ticks` ticks.
///
/// A zero-tick sleep degenerates to a plain yield.
pub fn sleep_ticks(ticks: u64) {
    if ticks == 0 {
        yield_cpu();
        return;
    }

    let _guard = interrupt::disable();

    let sleeper = current();
    let wake_tick = timer::total_ticks() + ticks;
    let inserted = SLEEP_QUEUE.lock().insert(sleeper.clone(), wake_tick);
    if let Err(err) = inserted {
        panic!("[SCHED] cannot sleep thread {}: {err}", sleeper.id());
    }
    log::trace!(
        "[SCHED] thread {} sleeping until tick {wake_tick}",
        sleeper.id()
    );
    block_current();
}

/// Move every sleeper whose deadline has passed back to the ready queue,
/// in deadline order.
pub(crate) fn wake_due_sleepers(now: u64) {
    loop {
        let woken = {
            let mut sleepers = SLEEP_QUEUE.lock();
            match sleepers.peek_min() {
                Some(tick) if tick <= now => sleepers.extract_min(),
                _ => None,
            }
        };
        let Some(thread) = woken else {
            return;
        };
        log::trace!("[SCHED] waking thread {} at tick {now}", thread.id());
        READY_QUEUE.lock().push(thread);
    }
}

/// Terminate the calling thread without recording an exit.
///
/// First half of two-phase destruction: designate the caller for
/// reclamation and switch away for the last time. The thread that runs
/// next frees the carcass.
pub(crate) fn finish_current() -> ! {
    interrupt::set_level(IntLevel::Off);

    let finished = current();
    log::debug!("[SCHED] thread {} finished", finished.id());
    DISPATCHER.designate_reclaim(finished);
    block_current();
    unreachable!("destroyed thread was scheduled again");
}

/// Exit the calling thread with `code`.
///
/// Ordering matters: the exit code is recorded and joiners are woken
/// strictly before the thread is finished, because nothing runs on this
/// thread afterwards.
pub fn exit_current(code: i32) -> ! {
    interrupt::set_level(IntLevel::Off);

    let exiting = current();
    let pid = exiting.id();
    log::info!(
        "[SCHED] thread {pid} \"{}\" exiting with code {code}",
        exiting.name()
    );

    tree::record_exit(pid, code);
    for waiter in join::resolve_exit(pid, code) {
        READY_QUEUE.lock().push(waiter);
    }

    finish_current();
}
