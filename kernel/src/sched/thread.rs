//! Thread control block and lifecycle state
//!
//! A [`Thread`] is one schedulable unit: identity, lifecycle state, owned
//! execution stack, and the saved context needed to resume it. Threads are
//! shared as `Arc<Thread>` between the ready queue, the sleep queue, the
//! join registry and the dispatcher's current slot; all mutable fields use
//! interior mutability and are only touched with preemption off.
//!
//! The bootstrap thread is special: it inherits the process's initial stack
//! and therefore owns no [`Stack`] of its own. Everything else gets a fixed
//! block with a guard word at the low end, checked on every switch away.

use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use spin::Mutex;

use crate::machine::context::SwitchContext;
use crate::machine::registers::{self, RegisterFile, R_RESULT};
use crate::process::Pid;

/// Words in a thread's execution stack.
pub const STACK_WORDS: usize = 1024;

/// Sentinel written at the low end of every stack, checked on each switch
/// to detect overflow.
pub(crate) const STACK_GUARD: u32 = 0xDEAD_BEEF;

/// Thread lifecycle state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Allocated but not yet schedulable; held only transiently during fork.
    Created = 0,
    /// On the ready queue, waiting for the dispatcher.
    Ready = 1,
    /// Executing. At most one thread holds this state at any instant.
    Running = 2,
    /// Off the ready queue until some wake authority requeues it.
    Blocked = 3,
}

impl ThreadState {
    fn from_u8(v: u8) -> ThreadState {
        match v {
            0 => ThreadState::Created,
            1 => ThreadState::Ready,
            2 => ThreadState::Running,
            3 => ThreadState::Blocked,
            _ => unreachable!("corrupt thread state {v}"),
        }
    }
}

/// Owned, fixed-size execution stack with an overflow guard word.
pub struct Stack {
    words: Box<[u32]>,
}

impl Stack {
    pub(crate) fn new() -> Self {
        let mut words = vec![0u32; STACK_WORDS].into_boxed_slice();
        words[0] = STACK_GUARD;
        Self { words }
    }

    /// Halt the kernel if the guard word has been overwritten.
    pub(crate) fn check(&self, owner: Pid) {
        if self.words[0] != STACK_GUARD {
            panic!("[SCHED] stack overflow detected on thread {owner}");
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_guard(&mut self) {
        self.words[0] = 0;
    }
}

/// What a freshly scheduled thread should do, decoded by the dispatcher's
/// trampoline rather than invoked through a raw function pointer.
pub enum EntryAction {
    /// Run the procedure; when it returns the thread takes the exit path.
    Call(Box<dyn FnOnce() + Send + 'static>),
    /// Restore the saved user-mode register set and enter the installed
    /// user-mode runner.
    ResumeUser,
}

/// Second register set carried by threads running a user-mode address
/// space, saved and restored around context switches.
pub struct UserContext {
    regs: RegisterFile,
    /// True while the simulated CPU holds this thread's registers; saving
    /// is skipped when nothing was restored since the last save.
    restored: bool,
}

impl UserContext {
    pub(crate) fn new(regs: RegisterFile) -> Self {
        Self {
            regs,
            restored: false,
        }
    }
}

/// Saved execution context: the opaque switch handle plus the pending entry
/// action for threads that have not run yet.
pub struct ThreadContext {
    switch: SwitchContext,
    entry: Option<EntryAction>,
}

/// Per-thread instrumentation counters. Not consulted for scheduling.
#[derive(Default)]
pub struct ThreadStats {
    /// Simulated instructions executed, charged by the timer.
    instructions: AtomicU64,
    /// Times this thread has been switched to.
    switches: AtomicU64,
}

impl ThreadStats {
    pub fn instructions(&self) -> u64 {
        self.instructions.load(Ordering::Relaxed)
    }

    pub fn switches(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }

    pub(crate) fn charge_instructions(&self, n: u64) {
        self.instructions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn mark_scheduled(&self) {
        self.switches.fetch_add(1, Ordering::Relaxed);
    }
}

/// Thread control block
pub struct Thread {
    id: Pid,
    parent: Option<Pid>,
    name: String,
    state: AtomicU8,
    stack: Mutex<Option<Stack>>,
    context: Mutex<ThreadContext>,
    user: Mutex<Option<UserContext>>,
    /// Result slot written by the join/exit notifier, read after wake.
    result: Mutex<Option<i32>>,
    /// Instrumentation counters.
    pub stats: ThreadStats,
}

impl Thread {
    /// Create a thread control block with a fresh stack, in `Created`
    /// state. Scheduling it is the caller's business.
    pub(crate) fn new(id: Pid, parent: Option<Pid>, name: &str) -> Arc<Thread> {
        Arc::new(Thread {
            id,
            parent,
            name: name.into(),
            state: AtomicU8::new(ThreadState::Created as u8),
            stack: Mutex::new(Some(Stack::new())),
            context: Mutex::new(ThreadContext {
                switch: SwitchContext::new(),
                entry: None,
            }),
            user: Mutex::new(None),
            result: Mutex::new(None),
            stats: ThreadStats::default(),
        })
    }

    /// Adopt the caller as the bootstrap thread: already running, on the
    /// process's initial stack, which is never freed.
    pub(crate) fn bootstrap(id: Pid, name: &str) -> Arc<Thread> {
        Arc::new(Thread {
            id,
            parent: None,
            name: name.into(),
            state: AtomicU8::new(ThreadState::Running as u8),
            stack: Mutex::new(None),
            context: Mutex::new(ThreadContext {
                switch: SwitchContext::new(),
                entry: None,
            }),
            user: Mutex::new(None),
            result: Mutex::new(None),
            stats: ThreadStats::default(),
        })
    }

    pub fn id(&self) -> Pid {
        self.id
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Handle to this thread's saved context for the switch primitive.
    pub(crate) fn switch_context(&self) -> SwitchContext {
        self.context.lock().switch.clone()
    }

    /// Seed the pending entry action before the first schedule.
    pub(crate) fn set_entry(&self, action: EntryAction) {
        self.context.lock().entry = Some(action);
    }

    /// Take the pending entry action; `None` once the thread has run.
    pub(crate) fn take_entry(&self) -> Option<EntryAction> {
        self.context.lock().entry.take()
    }

    /// Attach a user-mode register set to this thread.
    pub(crate) fn attach_user(&self, regs: RegisterFile) {
        *self.user.lock() = Some(UserContext::new(regs));
    }

    pub fn has_user_context(&self) -> bool {
        self.user.lock().is_some()
    }

    /// Save the simulated CPU's registers into this thread's user context,
    /// if it has one and they are dirty.
    pub(crate) fn save_user_state(&self) {
        if let Some(user) = self.user.lock().as_mut() {
            if user.restored {
                user.regs = registers::snapshot();
                user.restored = false;
            }
        }
    }

    /// Load this thread's user registers into the simulated CPU, if it has
    /// a user context.
    pub(crate) fn restore_user_state(&self) {
        if let Some(user) = self.user.lock().as_mut() {
            registers::load(&user.regs);
            user.restored = true;
        }
    }

    /// Deliver a join result: fill the result slot and, for user-mode
    /// threads, the saved result register.
    pub(crate) fn deliver_result(&self, code: i32) {
        *self.result.lock() = Some(code);
        if let Some(user) = self.user.lock().as_mut() {
            user.regs[R_RESULT] = code;
        }
    }

    /// Take the delivered join result, if any.
    pub(crate) fn take_result(&self) -> Option<i32> {
        self.result.lock().take()
    }

    /// Halt the kernel if this thread has overrun its stack. The bootstrap
    /// thread has no guarded stack to check.
    pub(crate) fn check_overflow(&self) {
        if let Some(stack) = self.stack.lock().as_ref() {
            stack.check(self.id);
        }
    }

    /// Free the execution stack. Called exactly once, by the dispatcher,
    /// strictly after it has switched away from this thread.
    pub(crate) fn release_stack(&self) {
        if self.parent.is_none() {
            // Bootstrap stack is inherited, never freed.
            return;
        }
        if self.stack.lock().take().is_none() {
            panic!("[SCHED] stack of thread {} released twice", self.id);
        }
    }
}
