//! Process bookkeeping integration tests
//!
//! Fork/join/exit semantics across the syscall surface: exit codes retained
//! for late joiners, the child relationship as the only join capability,
//! thread identity, and user-mode fork through the register convention.
//! Process state is process-wide, so every test takes the serial lock and
//! joins everything it forks before releasing it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use campus_kernel::machine::registers::{self, R_ARG1, R_RESULT};
use campus_kernel::syscall::{
    sys_exit, sys_fork, sys_fork_user, sys_getpid, sys_getppid, sys_join, sys_yield, JOIN_FAILED,
};

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

#[test]
fn test_join_after_child_exited_returns_retained_code() {
    let _lock = serial();
    campus_kernel::init("boot");

    let child = sys_fork("short-lived", || sys_exit(42));

    // Let the child run to completion before asking.
    sys_yield();
    assert_eq!(sys_join(child), 42);
}

#[test]
fn test_join_blocks_until_child_exits() {
    let _lock = serial();
    campus_kernel::init("boot");

    let child = sys_fork("lingerer", || {
        sys_yield();
        sys_yield();
        sys_yield();
        sys_exit(7);
    });

    // The child has not run at all yet; the join must wait out its whole
    // lifetime.
    assert_eq!(sys_join(child), 7);
}

#[test]
fn test_exit_code_is_retained_for_repeat_joins() {
    let _lock = serial();
    campus_kernel::init("boot");

    let child = sys_fork("once", || sys_exit(-3));
    assert_eq!(sys_join(child), -3);
    // The child is long gone; its record under this parent survives.
    assert_eq!(sys_join(child), -3);
}

#[test]
fn test_join_rejects_nonpositive_and_unknown_pids() {
    let _lock = serial();
    campus_kernel::init("boot");

    assert_eq!(sys_join(-1), JOIN_FAILED);
    assert_eq!(sys_join(0), JOIN_FAILED);
    assert_eq!(sys_join(9999), JOIN_FAILED);
}

#[test]
fn test_join_rejects_grandchild() {
    let _lock = serial();
    campus_kernel::init("boot");

    let grandchild_pid = Arc::new(Mutex::new(0i32));

    let slot = grandchild_pid.clone();
    let child = sys_fork("middle", move || {
        let grandchild = sys_fork("leaf", || sys_exit(11));
        *slot.lock().unwrap() = grandchild;
        assert_eq!(sys_join(grandchild), 11);
    });

    assert_eq!(sys_join(child), 0);

    // Only the direct parent may join; the grandparent is refused even
    // though the pid was real.
    let grandchild = *grandchild_pid.lock().unwrap();
    assert!(grandchild > 0);
    assert_eq!(sys_join(grandchild), JOIN_FAILED);
}

#[test]
fn test_sibling_cannot_join_sibling() {
    let _lock = serial();
    campus_kernel::init("boot");

    let worker = sys_fork("worker", || {
        sys_yield();
        sys_exit(9);
    });

    let observed = Arc::new(Mutex::new(0i32));
    let observed_in = observed.clone();
    let snoop = sys_fork("snoop", move || {
        *observed_in.lock().unwrap() = sys_join(worker);
    });

    assert_eq!(sys_join(snoop), 0);
    assert_eq!(*observed.lock().unwrap(), JOIN_FAILED);

    assert_eq!(sys_join(worker), 9);
}

#[test]
fn test_pid_and_ppid_identity() {
    let _lock = serial();
    campus_kernel::init("boot");

    let boot_pid = sys_getpid();
    assert!(boot_pid > 0);

    let seen = Arc::new(Mutex::new((0i32, 0i32)));
    let seen_in = seen.clone();
    let child = sys_fork("identified", move || {
        *seen_in.lock().unwrap() = (sys_getpid(), sys_getppid());
    });

    assert_eq!(sys_join(child), 0);

    let (child_pid, child_ppid) = *seen.lock().unwrap();
    assert_eq!(child_pid, child);
    assert_eq!(child_ppid, boot_pid);
    assert_ne!(child_pid, boot_pid);
}

#[test]
fn test_children_join_in_any_order() {
    let _lock = serial();
    campus_kernel::init("boot");

    let mut pids = Vec::new();
    for code in 1..=5 {
        pids.push(sys_fork("batch", move || sys_exit(code)));
    }

    // Join newest-first; codes come back matched to pids regardless.
    for (i, pid) in pids.iter().enumerate().rev() {
        assert_eq!(sys_join(*pid), i as i32 + 1);
    }
}

#[test]
fn test_user_fork_follows_register_convention() {
    let _lock = serial();
    campus_kernel::init("boot");

    // The runner stands in for the instruction simulator: it runs with the
    // child's registers loaded and ends the thread through exit.
    registers::install_user_runner(|| {
        let arg = registers::read(R_ARG1);
        sys_exit(arg + 1);
    });

    registers::write(R_ARG1, 41);
    let child = sys_fork_user("ucalc");

    // Caller side of the fork: child pid in the result register.
    assert_eq!(registers::read(R_RESULT), child);

    // Child side: saw 0 in its result register, read 41 from the argument
    // register, exited with 42.
    assert_eq!(sys_join(child), 42);
}
