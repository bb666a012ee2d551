//! Simulated user-mode machine state
//!
//! One process-wide register file stands in for the simulated CPU. A thread
//! running a user-mode address space carries a second, private copy of these
//! registers in its saved context; the dispatcher swaps the private copy in
//! and out around every context switch.
//!
//! Calling convention at the syscall boundary: results are written to
//! register [`R_RESULT`], the first argument is read from [`R_ARG1`].

use spin::Mutex;
use std::sync::Arc;

/// Number of registers in the simulated CPU.
pub const NUM_REGS: usize = 40;

/// Register holding a syscall result.
pub const R_RESULT: usize = 2;

/// Register holding the first syscall argument.
pub const R_ARG1: usize = 4;

/// A full snapshot of the simulated CPU registers.
pub type RegisterFile = [i32; NUM_REGS];

static REGISTERS: Mutex<RegisterFile> = Mutex::new([0; NUM_REGS]);

/// Read one register of the simulated CPU.
pub fn read(reg: usize) -> i32 {
    if reg >= NUM_REGS {
        panic!("[MACHINE] read of invalid register {reg}");
    }
    REGISTERS.lock()[reg]
}

/// Write one register of the simulated CPU.
pub fn write(reg: usize, value: i32) {
    if reg >= NUM_REGS {
        panic!("[MACHINE] write of invalid register {reg}");
    }
    REGISTERS.lock()[reg] = value;
}

/// Snapshot the whole register file.
pub(crate) fn snapshot() -> RegisterFile {
    *REGISTERS.lock()
}

/// Load a full register file into the simulated CPU.
pub(crate) fn load(regs: &RegisterFile) {
    *REGISTERS.lock() = *regs;
}

// ---------------------------------------------------------------------------
// User-mode runner hook
// ---------------------------------------------------------------------------

type UserRunner = Arc<dyn Fn() + Send + Sync>;

static USER_RUNNER: Mutex<Option<UserRunner>> = Mutex::new(None);

/// Install the user-mode runner.
///
/// The runner plays the role of the instruction-level simulator: when a
/// thread whose pending entry action is "resume in user mode" is first
/// scheduled, the runner is invoked with that thread's register file already
/// loaded. It is expected to end the thread through the exit syscall.
pub fn install_user_runner(runner: impl Fn() + Send + Sync + 'static) {
    *USER_RUNNER.lock() = Some(Arc::new(runner));
}

/// Enter user mode on the calling thread.
pub(crate) fn run_user() {
    let runner = USER_RUNNER.lock().clone();
    match runner {
        Some(run) => run(),
        None => panic!("[MACHINE] no user-mode runner installed"),
    }
}
