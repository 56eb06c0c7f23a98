/*
 * Scheduler Core - Dispatch Mechanism
 *
 * This module implements the per-CPU dispatch loop and the two ways a
 * process gives its CPU back (`sched`, `yield_now`).
 *
 * Each CPU runs `Scheduler::start`, which never returns. One iteration:
 *
 * 1. Enable interrupts, so a machine with nothing runnable still takes
 *    device interrupts.
 * 2. Re-level the queues if the tick count entered a new period.
 * 3. Pop the oldest process of the highest non-empty level.
 * 4. Lock it and make sure it is still Runnable.
 * 5. Record the dispatch in the event log (if logging).
 * 6. Mark it Running and switch to it.
 * 7. When it switches back: count the run, forget it, unlock.
 *
 * The slot lock taken in step 4 is held across the switch. The process
 * releases it when it resumes (or in `forkret` the first time), and takes
 * it again before switching back, so the slot's state and the CPU's saved
 * context are never observed half-updated.
 *
 * Quantum budgets (`Level::quantum_ticks`) are not enforced: a process
 * changes level only when its nice value changes and the re-leveler runs,
 * or when it re-enters a queue through a lifecycle transition.
 */

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::process::{Proc, ProcInner, ProcessState};
use super::scheduler::Scheduler;
use super::types::{CpuId, Level, Nice, SlotId};
use crate::arch::{self, Context};
use crate::sync::SpinLockGuard;

const NO_PROC: usize = usize::MAX;
const NEVER: u64 = u64::MAX;

/// Per-CPU scheduling state
pub struct PerCpuSchedState {
    /// Which CPU this state belongs to
    pub cpu_id: CpuId,

    /// Slot running on this CPU, or NO_PROC
    current: AtomicUsize,

    /// Saved context of this CPU's dispatch loop
    context: UnsafeCell<Context>,

    /// Re-level period this CPU last re-leveled in
    relevel_epoch: AtomicU64,

    /// Number of dispatches performed
    dispatches: AtomicU64,
}

// SAFETY: `context` is only touched by the owning CPU inside `swtch`.
unsafe impl Sync for PerCpuSchedState {}

impl PerCpuSchedState {
    /// Create new per-CPU state
    pub fn new(cpu_id: CpuId) -> Self {
        Self {
            cpu_id,
            current: AtomicUsize::new(NO_PROC),
            context: UnsafeCell::new(Context::default()),
            relevel_epoch: AtomicU64::new(NEVER),
            dispatches: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Option<SlotId> {
        match self.current.load(Ordering::Acquire) {
            NO_PROC => None,
            slot => Some(slot),
        }
    }

    fn set_current(&self, slot: Option<SlotId>) {
        self.current.store(slot.unwrap_or(NO_PROC), Ordering::Release);
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    fn context_ptr(&self) -> *mut Context {
        self.context.get()
    }
}

impl Scheduler {
    /// Run this CPU's dispatch loop forever
    ///
    /// Called once per CPU at the end of boot, after `arch::init_cpu`.
    pub fn start(&self) -> ! {
        log::info!("[Sched] cpu {} entering dispatch loop", arch::cpu_id());
        loop {
            self.schedule_once();
        }
    }

    /// One iteration of the dispatch loop
    ///
    /// # Returns
    ///
    /// `true` if a process was dispatched and has given the CPU back,
    /// `false` if there was nothing to run.
    pub fn schedule_once(&self) -> bool {
        arch::intr_on();

        let cpu = self.this_cpu();
        self.maybe_relevel(cpu);

        let Some(slot) = self.pick_next() else {
            arch::idle_hint();
            return false;
        };

        let proc = &self.procs[slot];
        let mut p = proc.lock();
        if p.state != ProcessState::Runnable {
            log::warn!("[Sched] slot {} dequeued while {}", slot, p.state.name());
            return false;
        }

        self.event_log.record(p.pid, || self.ticks());
        p.state = ProcessState::Running;
        cpu.set_current(Some(slot));
        log::trace!("[Sched] cpu {} -> pid {}", cpu.cpu_id.as_usize(), p.pid);

        // SAFETY: this CPU holds the slot lock, so nobody else switches
        // into or out of either context.
        unsafe {
            arch::swtch(cpu.context_ptr(), proc.context_ptr());
        }

        // The process changed its own state before switching back.
        p.run_ticks += 1;
        cpu.set_current(None);
        cpu.dispatches.fetch_add(1, Ordering::Relaxed);
        drop(p);
        true
    }

    /// Pop the next process by strict level priority
    pub(super) fn pick_next(&self) -> Option<SlotId> {
        let mut queues = self.queues.lock();
        Level::DESCENDING.iter().find_map(|&level| queues.pop_back(level))
    }

    fn maybe_relevel(&self, cpu: &PerCpuSchedState) {
        let epoch = self.ticks() / self.config.relevel_period;
        if cpu.relevel_epoch.swap(epoch, Ordering::Relaxed) != epoch {
            self.relevel();
        }
    }

    /// Move queued processes whose nice value now calls for another level
    ///
    /// # Returns
    ///
    /// Number of relocated processes.
    pub fn relevel(&self) -> usize {
        let moved = self
            .queues
            .lock()
            .relevel(|slot| self.procs[slot].target_level());

        if moved > 0 {
            log::debug!("[Sched] re-leveled {} process(es) at tick {}", moved, self.ticks());
        }
        moved
    }

    /// Switch from the calling process back to this CPU's dispatch loop
    ///
    /// The caller holds its own slot lock (and no other lock) and has
    /// already moved itself out of Running. Returns when the process is
    /// dispatched again, possibly on another CPU.
    ///
    /// # Panics
    ///
    /// If any of those preconditions does not hold, or if interrupts are
    /// enabled.
    pub(super) fn sched(&self, proc: &Proc, inner: &ProcInner) {
        Self::check_switch(proc, inner);

        // intena belongs to this kernel thread, not to the CPU.
        let intena = arch::intena();
        let cpu = self.this_cpu();
        // SAFETY: the slot lock is held; see schedule_once.
        unsafe {
            arch::swtch(proc.context_ptr(), cpu.context_ptr());
        }
        arch::set_intena(intena);
    }

    /// Final switch of an exiting process
    ///
    /// Same preconditions as `sched`. The dispatch loop that resumes
    /// releases the slot lock; the calling context is never resumed.
    pub(super) fn sched_exit(&self, proc: &Proc, p: SpinLockGuard<'_, ProcInner>) -> ! {
        Self::check_switch(proc, &p);

        let cpu = self.this_cpu();
        core::mem::forget(p);
        // SAFETY: the slot lock is held until the dispatch loop drops it,
        // and the slot gets a fresh context before it runs again.
        unsafe { arch::swtch_exit(proc.context_ptr(), cpu.context_ptr()) }
    }

    fn check_switch(proc: &Proc, inner: &ProcInner) {
        if !proc.lock_ref().holding() {
            panic!("sched p->lock");
        }
        if arch::noff() != 1 {
            panic!("sched locks");
        }
        if inner.state == ProcessState::Running {
            panic!("sched running");
        }
        if arch::intr_get() {
            panic!("sched interruptible");
        }
    }

    /// Give up the CPU for one scheduling round
    pub fn yield_now(&self) {
        let (slot, proc) = self.current();
        let mut p = proc.lock();
        p.state = ProcessState::Runnable;
        self.enqueue(slot);
        self.sched(proc, &p);
    }

    /// Add `delta` to the calling process's nice value
    ///
    /// The result is clamped to the valid range. The process's queue level
    /// follows at its next enqueue or the next re-level.
    ///
    /// # Returns
    ///
    /// The resulting nice value.
    pub fn adjust_nice(&self, delta: i32) -> Nice {
        let (_, proc) = self.current();
        let nice = proc.nice().adjust(delta);
        proc.set_nice(nice);
        log::debug!("[Sched] nice {:+} -> {}", delta, nice.get());
        nice
    }

    /// Dispatches performed by CPU `cpu`
    pub fn dispatch_count(&self, cpu: CpuId) -> u64 {
        self.cpus.get(cpu.as_usize()).map_or(0, PerCpuSchedState::dispatches)
    }
}
