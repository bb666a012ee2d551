//! Process identity and parent/child bookkeeping
//!
//! A pid names one thread for its entire lifetime in a run. The process
//! tree records who created whom and what each child exited with; the join
//! registry wakes threads blocked on a child's exit.

use core::fmt;

pub mod join;
pub mod tree;

/// Maximum number of concurrently live threads. Pids run `1..=MAX_THREADS`.
pub const MAX_THREADS: usize = 128;

/// Process/thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
