//! Process tree and pid allocator
//!
//! One entry per pid ever created. A pid is live from allocation until the
//! dispatcher has destroyed the thread holding it; only then may it be
//! handed out again. Child records are kept under the parent for the whole
//! run and are only ever marked dead with a terminal exit code, so a parent
//! can join a child that exited long ago.
//!
//! All mutators assume the caller holds the preemption-off critical section
//! of the outward-facing entry point (fork, exit, join).

use std::collections::BTreeMap;

use spin::Mutex;

use super::{Pid, MAX_THREADS};
use crate::error::{KernelError, KernelResult};

/// One child as seen from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRecord {
    /// Pid of the child.
    pub pid: Pid,
    /// False once the child has exited.
    pub alive: bool,
    /// Terminal exit code; `None` while the child is still running.
    pub exit_code: Option<i32>,
}

/// Pid occupancy and parent/child exit records.
pub struct ProcessTree {
    /// Occupancy per pid; index 0 is unused.
    in_use: [bool; MAX_THREADS + 1],
    /// Index of the last allocated pid; allocation scans round-robin from
    /// the slot after it.
    cursor: usize,
    /// Ordered child records per parent, append-only.
    children: BTreeMap<Pid, Vec<ChildRecord>>,
    /// Parent of each pid ever allocated. `None` for the bootstrap thread.
    parents: BTreeMap<Pid, Option<Pid>>,
}

impl ProcessTree {
    /// Create an empty tree.
    pub const fn new() -> Self {
        Self {
            in_use: [false; MAX_THREADS + 1],
            cursor: 0,
            children: BTreeMap::new(),
            parents: BTreeMap::new(),
        }
    }

    /// Allocate a fresh pid for a child of `parent`.
    ///
    /// Scans for the next free pid in round-robin order starting after the
    /// last-allocated one, records the child under its parent, and marks the
    /// pid live.
    pub fn allocate(&mut self, parent: Option<Pid>) -> KernelResult<Pid> {
        let mut idx = self.cursor;
        for _ in 0..MAX_THREADS {
            idx = if idx >= MAX_THREADS { 1 } else { idx + 1 };
            if !self.in_use[idx] {
                self.cursor = idx;
                self.in_use[idx] = true;

                let pid = Pid(idx as u32);
                self.parents.insert(pid, parent);
                if let Some(parent) = parent {
                    self.children.entry(parent).or_default().push(ChildRecord {
                        pid,
                        alive: true,
                        exit_code: None,
                    });
                }
                return Ok(pid);
            }
        }
        Err(KernelError::ResourceExhausted {
            resource: "pid space",
        })
    }

    /// Record the terminal exit code of `pid` in its parent's child list.
    ///
    /// The exit code transitions from absent to present exactly once; a
    /// second recording for the same entry is a kernel bug.
    pub fn record_exit(&mut self, pid: Pid, code: i32) {
        let parent = self.parents.get(&pid).copied().flatten();
        let Some(parent) = parent else {
            // Bootstrap thread: no parent watches it.
            return;
        };

        let record = self
            .children
            .get_mut(&parent)
            .and_then(|kids| kids.iter_mut().rev().find(|r| r.pid == pid));

        match record {
            Some(record) => {
                if record.exit_code.is_some() {
                    panic!("[PROCESS] exit code for pid {pid} recorded twice");
                }
                record.alive = false;
                record.exit_code = Some(code);
            }
            None => panic!("[PROCESS] exiting pid {pid} has no child record"),
        }
    }

    /// Look up `target` among `caller`'s children.
    ///
    /// Returns `Ok(None)` while the child is still running, `Ok(Some(code))`
    /// once it has exited, and [`KernelError::NotAChild`] if `caller` never
    /// created `target`.
    pub fn status(&self, caller: Pid, target: Pid) -> KernelResult<Option<i32>> {
        self.children
            .get(&caller)
            .and_then(|kids| kids.iter().rev().find(|r| r.pid == target))
            .map(|r| r.exit_code)
            .ok_or(KernelError::NotAChild { pid: target.0 })
    }

    /// Free a pid after its thread has been destroyed.
    pub fn release(&mut self, pid: Pid) {
        let idx = pid.0 as usize;
        if idx == 0 || idx > MAX_THREADS || !self.in_use[idx] {
            panic!("[PROCESS] release of pid {pid} that is not live");
        }
        self.in_use[idx] = false;
    }

    /// Number of currently live pids.
    pub fn live_count(&self) -> usize {
        self.in_use.iter().filter(|&&used| used).count()
    }

    /// Child records of `pid`, oldest first.
    pub fn children_of(&self, pid: Pid) -> Vec<ChildRecord> {
        self.children.get(&pid).cloned().unwrap_or_default()
    }
}

impl Default for ProcessTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Global process tree instance
static PROCESS_TREE: Mutex<ProcessTree> = Mutex::new(ProcessTree::new());

/// Allocate a fresh pid in the global tree.
pub(crate) fn allocate(parent: Option<Pid>) -> KernelResult<Pid> {
    PROCESS_TREE.lock().allocate(parent)
}

/// Record an exit code in the global tree.
pub(crate) fn record_exit(pid: Pid, code: i32) {
    PROCESS_TREE.lock().record_exit(pid, code);
}

/// Query a child's status in the global tree.
pub(crate) fn status(caller: Pid, target: Pid) -> KernelResult<Option<i32>> {
    PROCESS_TREE.lock().status(caller, target)
}

/// Release a pid in the global tree.
pub(crate) fn release(pid: Pid) {
    PROCESS_TREE.lock().release(pid);
}
