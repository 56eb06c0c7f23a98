/*
 * Process Control Blocks
 *
 * This module defines one slot of the process table. A slot is reused for
 * many processes over the kernel's lifetime; `ProcessState::Unused` marks
 * it free.
 *
 * A slot carries:
 * - identity: pid and name
 * - lifecycle state, sleep channel, kill flag and exit status
 * - owned resources: trap-frame page, address space, open files, cwd
 * - the saved kernel execution context
 * - the nice value, readable by the re-leveler without the slot lock
 *
 * Locking:
 * Everything in `ProcInner` is guarded by the slot lock. The saved
 * context is only touched by the CPU holding the slot lock while it is
 * switching into or out of the process. The parent link is not stored
 * here at all: it lives in the scheduler's parent table under the wait
 * lock.
 */

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI32, Ordering};

use heapless::String;

use super::context::TrapFrame;
use super::types::{Channel, Level, Nice, SlotId};
use crate::arch::Context;
use crate::config::{NOFILE, PROC_NAME_LEN};
use crate::platform::{AddressSpace, DirRef, FileRef, PhysPage};
use crate::sync::{SpinLock, SpinLockGuard};

/// Unique identifier for a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub usize);

impl ProcessId {
    /// Create a new ProcessId
    pub fn new(id: usize) -> Self {
        ProcessId(id)
    }

    /// Get the raw ID value
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot is free
    Unused,
    /// Slot is claimed and being set up
    Used,
    /// Blocked on a sleep channel
    Sleeping,
    /// Ready to run, linked into a queue level
    Runnable,
    /// Executing on a CPU
    Running,
    /// Exited, waiting for its parent to reap it
    Zombie,
}

impl ProcessState {
    /// Fixed-width name used by the process listing
    pub fn name(self) -> &'static str {
        match self {
            ProcessState::Unused => "unused",
            ProcessState::Used => "used  ",
            ProcessState::Sleeping => "sleep ",
            ProcessState::Runnable => "runble",
            ProcessState::Running => "run   ",
            ProcessState::Zombie => "zombie",
        }
    }
}

/// Slot fields guarded by the slot lock
pub struct ProcInner {
    pub state: ProcessState,
    pub pid: ProcessId,

    /// Channel slept on; meaningful only while Sleeping
    pub chan: Option<Channel>,

    pub killed: bool,

    /// Exit status, valid once Zombie
    pub xstate: i32,

    /// Dispatches since allocation
    pub run_ticks: u64,

    pub name: String<PROC_NAME_LEN>,

    pub trapframe: Option<PhysPage>,
    pub pagetable: Option<AddressSpace>,

    /// Size of user memory in bytes
    pub sz: usize,

    pub files: [Option<FileRef>; NOFILE],
    pub cwd: Option<DirRef>,
}

impl ProcInner {
    fn unused() -> Self {
        Self {
            state: ProcessState::Unused,
            pid: ProcessId(0),
            chan: None,
            killed: false,
            xstate: 0,
            run_ticks: 0,
            name: String::new(),
            trapframe: None,
            pagetable: None,
            sz: 0,
            files: [None; NOFILE],
            cwd: None,
        }
    }

    /// Replace the name, truncated to the last whole character that fits
    pub fn set_name(&mut self, name: &str) {
        self.name.clear();
        for ch in name.chars() {
            if self.name.push(ch).is_err() {
                break;
            }
        }
    }

    /// The saved user registers
    ///
    /// # Panics
    ///
    /// If the slot has no trap-frame page (Unused slot).
    pub fn trapframe_mut(&mut self) -> &mut TrapFrame {
        let page = match self.trapframe {
            Some(page) => page,
            None => panic!("pid {} has no trapframe", self.pid),
        };
        // SAFETY: the page belongs to this slot alone and the slot lock is
        // held for as long as the returned borrow lives.
        unsafe { &mut *page.as_mut_ptr::<TrapFrame>() }
    }
}

/// One slot of the process table
pub struct Proc {
    inner: SpinLock<ProcInner>,

    /// Saved kernel context; see module docs for the access rule
    context: UnsafeCell<Context>,

    /// Nice value, read without the slot lock by the re-leveler
    nice: AtomicI32,
}

// SAFETY: `context` is only accessed by the CPU that holds `inner` while
// switching; every other field synchronizes itself.
unsafe impl Sync for Proc {}

impl Proc {
    pub fn new() -> Self {
        Self {
            inner: SpinLock::new("proc", ProcInner::unused()),
            context: UnsafeCell::new(Context::default()),
            nice: AtomicI32::new(0),
        }
    }

    /// Acquire the slot lock
    pub fn lock(&self) -> SpinLockGuard<'_, ProcInner> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, ProcInner>> {
        self.inner.try_lock()
    }

    pub fn lock_ref(&self) -> &SpinLock<ProcInner> {
        &self.inner
    }

    pub fn nice(&self) -> Nice {
        Nice::new(self.nice.load(Ordering::Relaxed))
    }

    pub fn set_nice(&self, nice: Nice) {
        self.nice.store(nice.get(), Ordering::Relaxed);
    }

    /// Level this process belongs in according to its nice value
    pub fn target_level(&self) -> Level {
        Level::from_nice(self.nice())
    }

    /// Raw pointer to the saved context, for `swtch`
    pub fn context_ptr(&self) -> *mut Context {
        self.context.get()
    }

    /// Replace the saved context
    ///
    /// # Safety
    ///
    /// The slot lock must be held and the slot must not be executing or
    /// parked inside `swtch`.
    pub unsafe fn reset_context(&self, context: Context) {
        unsafe {
            *self.context.get() = context;
        }
    }
}

impl Default for Proc {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time description of one process slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub slot: SlotId,
    pub pid: ProcessId,
    pub state: ProcessState,
    pub name: String<PROC_NAME_LEN>,
    pub nice: Nice,

    /// Queue level the slot is linked into, if any
    pub queued: Option<Level>,

    pub run_ticks: u64,
}

impl core::fmt::Display for ProcInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let level = Level::from_nice(self.nice);
        write!(
            f,
            "{} {} {} nice={} {} ticks={}/{}",
            self.pid,
            self.state.name(),
            self.name,
            self.nice.get(),
            level,
            self.run_ticks,
            level.quantum_ticks()
        )
    }
}
