//! Simulated machine layer
//!
//! Everything the scheduling core consumes from the hardware/interrupt side
//! lives here, specified only at its interface boundary:
//!
//! - [`interrupt`]: disable/restore the preemption level. Turning the level
//!   off is the *only* mutual-exclusion mechanism the scheduling core uses;
//!   a blocking lock that had to suspend would re-enter the dispatcher
//!   before releasing it.
//! - [`context`]: the opaque switch-to primitive. Transfers control to
//!   another thread's saved context and returns only when some later switch
//!   resumes the original one.
//! - [`timer`]: the discrete tick source. Advancing time is what wakes
//!   timed sleepers.
//! - [`registers`]: the simulated user-mode register file and the syscall
//!   calling convention (results in register 2, first argument in 4).
//!
//! The instruction-level simulator itself is not part of this crate; a
//! user-mode runner can be installed via [`registers::install_user_runner`].

pub mod context;
pub mod interrupt;
pub mod registers;
pub mod timer;
