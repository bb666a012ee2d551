//! Syscall surface
//!
//! Thin dispatch layer between user programs (simulated or in-process) and
//! the scheduler. Calls follow the machine's register convention: results
//! land in the result register for threads carrying a user context, and are
//! also returned directly for in-kernel callers.
//!
//! Join errors are deliberately indistinct: joining a pid that is not your
//! live-or-exited child yields [`JOIN_FAILED`], whether the pid never
//! existed, belongs to someone else's child, or was mistyped. The child
//! relationship is the only capability.

use std::sync::Arc;

use crate::machine::interrupt;
use crate::machine::registers::{self, R_RESULT};
use crate::machine::timer;
use crate::process::{join, tree, Pid};
use crate::sched::{self, thread::Thread};

/// Result of a join that could not be performed.
pub const JOIN_FAILED: i32 = -1;

/// Fork a kernel thread running `entry`; returns the child's pid.
pub fn sys_fork(name: &str, entry: impl FnOnce() + Send + 'static) -> i32 {
    sched::spawn(name, entry).0 as i32
}

/// Fork a user-mode child that resumes with a copy of the caller's
/// registers.
///
/// Both sides continue from the fork: the child sees 0 in its result
/// register, the caller sees the child's pid.
pub fn sys_fork_user(name: &str) -> i32 {
    let mut child_regs = registers::snapshot();
    child_regs[R_RESULT] = 0;

    let pid = sched::spawn_user(name, child_regs);
    registers::write(R_RESULT, pid.0 as i32);
    pid.0 as i32
}

/// Relinquish the CPU to the next ready thread, if any.
pub fn sys_yield() {
    sched::yield_cpu();
}

/// Sleep for at least `ticks` ticks.
pub fn sys_sleep(ticks: u64) {
    sched::sleep_ticks(ticks);
}

/// Exit the calling thread with `code`. Does not return.
pub fn sys_exit(code: i32) -> ! {
    sched::exit_current(code);
}

/// Wait for the caller's child `pid` to exit and return its exit code.
///
/// Returns immediately if the child already exited; blocks until it does
/// otherwise. Returns [`JOIN_FAILED`] if `pid` is not a child of the
/// caller.
pub fn sys_join(pid: i32) -> i32 {
    let _guard = interrupt::disable();

    let caller = sched::current();
    let result = if pid <= 0 {
        JOIN_FAILED
    } else {
        join_child(&caller, Pid(pid as u32))
    };

    if caller.has_user_context() {
        registers::write(R_RESULT, result);
    }
    result
}

fn join_child(caller: &Arc<Thread>, target: Pid) -> i32 {
    match tree::status(caller.id(), target) {
        Err(err) => {
            log::debug!("[PROCESS] thread {} join refused: {err}", caller.id());
            JOIN_FAILED
        }
        // Child already exited; its code was retained for us.
        Ok(Some(code)) => code,
        // Child still running: park until its exit resolves us.
        Ok(None) => {
            join::register_waiter(caller.clone(), target);
            sched::block_current();
            match caller.take_result() {
                Some(code) => code,
                None => panic!("[PROCESS] woken joiner {} has no result", caller.id()),
            }
        }
    }
}

/// Pid of the calling thread.
pub fn sys_getpid() -> i32 {
    sched::current().id().0 as i32
}

/// Pid of the calling thread's parent, or 0 for the bootstrap thread.
pub fn sys_getppid() -> i32 {
    match sched::current().parent() {
        Some(parent) => parent.0 as i32,
        None => 0,
    }
}

/// Total ticks elapsed since boot.
pub fn sys_time() -> u64 {
    timer::total_ticks()
}

/// Simulated instructions charged to the calling thread.
pub fn sys_instructions() -> u64 {
    sched::current().stats.instructions()
}
