//! CampusOS Kernel Library
//!
//! Concurrency core of the CampusOS teaching kernel: a cooperative thread
//! dispatcher, a thread lifecycle state machine, a tick-driven sleep queue,
//! and parent/child exit bookkeeping behind a fork/join/exit syscall
//! surface. The machine layer simulates the hardware the kernel runs on, so
//! the whole kernel is an ordinary hosted crate.
//!
//! Control transfer is strictly cooperative: a thread keeps the CPU until
//! it yields, sleeps, blocks on a join, or exits.

pub mod error;
pub mod machine;
pub mod process;
pub mod sched;
pub mod syscall;

// Re-export the items tests and embedders touch most.
pub use error::{KernelError, KernelResult};
pub use process::Pid;
pub use sched::thread::{Thread, ThreadState};

/// Start the kernel: adopt the calling thread as the bootstrap thread.
pub fn init(name: &str) {
    sched::init(name);
}
