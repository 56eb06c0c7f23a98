/*
 * Scheduler Context Object
 *
 * `Scheduler` owns every piece of scheduling state of one machine:
 *
 * - the process table (one `Proc` per slot)
 * - the queue table of the three MLFQ levels, behind its own lock
 * - the parent table, behind the wait lock
 * - per-CPU dispatch state
 * - the tick counter and its lock
 * - the dispatch event log
 * - the platform the lifecycle allocates resources from
 *
 * There is no global instance. The kernel binary creates one at boot,
 * stores it somewhere with a 'static lifetime and hands that reference to
 * every CPU's dispatch loop. Processes find their way back to it through
 * the argument of their first kernel activation.
 *
 * Lock order (outermost first):
 *   wait lock / tick lock  ->  slot lock  ->  queue lock / log lock
 *
 * The operations are spread over sibling modules as separate `impl`
 * blocks: `sched_core` (dispatch), `lifecycle` (fork/exit/wait/kill) and
 * `io_wait` (sleep/wakeup, ticks).
 */

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::context::TrapFrame;
use super::events::EventLog;
use super::lifecycle::ParentTable;
use super::policies::QueueTable;
use super::process::{Proc, ProcInfo, ProcInner, ProcessId, ProcessState};
use super::sched_core::PerCpuSchedState;
use super::types::{CpuId, Level, SlotId};
use crate::arch;
use crate::config::SchedulerConfig;
use crate::error::KernelError;
use crate::platform::Platform;
use crate::sync::SpinLock;

/// Process scheduler and process table of one machine
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) platform: Box<dyn Platform>,

    pub(super) procs: Vec<Proc>,

    /// Run queues; a leaf lock
    pub(super) queues: SpinLock<QueueTable>,

    /// Parent links of all slots; this lock is the wait lock
    pub(super) parents: SpinLock<ParentTable>,

    pub(super) cpus: Vec<PerCpuSchedState>,

    pub(super) next_pid: AtomicUsize,

    /// Slot of the init process, set once by `userinit`
    pub(super) init_slot: spin::Once<SlotId>,

    pub(super) ticks: AtomicU64,

    /// Serializes tick updates with tick sleepers
    pub(super) tick_lock: SpinLock<()>,

    pub(super) event_log: EventLog,
}

impl Scheduler {
    /// Build an idle machine with every slot Unused
    ///
    /// # Arguments
    ///
    /// * `config` - table sizes and re-leveling period
    /// * `platform` - collaborators that provide memory, files and traps
    ///
    /// # Returns
    ///
    /// `InvalidConfig` if `config` does not fit the compile-time tables.
    pub fn new(config: SchedulerConfig, platform: Box<dyn Platform>) -> Result<Self, KernelError> {
        config.validate().map_err(KernelError::InvalidConfig)?;

        let procs = (0..config.nproc).map(|_| Proc::new()).collect();
        let cpus = (0..config.ncpu)
            .map(|id| PerCpuSchedState::new(CpuId(id as u32)))
            .collect();

        log::info!(
            "[Scheduler] MLFQ ready: {} slots, {} CPUs, re-level every {} ticks",
            config.nproc,
            config.ncpu,
            config.relevel_period
        );

        Ok(Self {
            config,
            platform,
            procs,
            queues: SpinLock::new("queues", QueueTable::new(config.nproc)),
            parents: SpinLock::new("wait_lock", ParentTable::new(config.nproc)),
            cpus,
            next_pid: AtomicUsize::new(1),
            init_slot: spin::Once::new(),
            ticks: AtomicU64::new(0),
            tick_lock: SpinLock::new("time", ()),
            event_log: EventLog::new(),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Clock ticks since boot
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(super) fn alloc_pid(&self) -> ProcessId {
        ProcessId(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }

    /// Dispatch state of the executing CPU
    ///
    /// Interrupts must be off, or the caller must be a dispatch loop.
    pub(super) fn this_cpu(&self) -> &PerCpuSchedState {
        let id = arch::cpu_id();
        match self.cpus.get(id) {
            Some(cpu) => cpu,
            None => panic!("cpu {} not configured", id),
        }
    }

    /// Slot of the process running on this CPU, if any
    pub fn current_slot(&self) -> Option<SlotId> {
        arch::push_off();
        let slot = self.this_cpu().current();
        arch::pop_off();
        slot
    }

    /// Pid of the process running on this CPU, if any
    pub fn current_pid(&self) -> Option<ProcessId> {
        let slot = self.current_slot()?;
        Some(self.procs[slot].lock().pid)
    }

    /// The calling process
    ///
    /// # Panics
    ///
    /// When called from a dispatch loop rather than a process.
    pub(super) fn current(&self) -> (SlotId, &Proc) {
        match self.current_slot() {
            Some(slot) => (slot, &self.procs[slot]),
            None => panic!("no current process"),
        }
    }

    /// Run `f` on the calling process's saved user registers
    pub fn with_trapframe<R>(&self, f: impl FnOnce(&mut TrapFrame) -> R) -> R {
        let (_, proc) = self.current();
        let mut p = proc.lock();
        f(p.trapframe_mut())
    }

    /// Copy `bytes` to user address `addr` of the calling process
    pub fn copy_to_user(&self, addr: usize, bytes: &[u8]) -> Result<(), KernelError> {
        let (_, proc) = self.current();
        let space = proc.lock().pagetable;
        match space {
            Some(space) => self.platform.copy_out(space, addr, bytes),
            None => Err(KernelError::BadAddress),
        }
    }

    /// Link `slot` into the level its nice value calls for
    ///
    /// # Panics
    ///
    /// If the queue table refuses the slot: it is already queued.
    pub(super) fn enqueue(&self, slot: SlotId) {
        let level = self.procs[slot].target_level();
        if !self.queues.lock().push_front(level, slot) {
            panic!("enqueue: slot {} already queued", slot);
        }
    }

    fn info_of(&self, slot: SlotId, inner: &ProcInner, queued: Option<Level>) -> ProcInfo {
        ProcInfo {
            slot,
            pid: inner.pid,
            state: inner.state,
            name: inner.name.clone(),
            nice: self.procs[slot].nice(),
            queued,
            run_ticks: inner.run_ticks,
        }
    }

    /// Snapshot of every slot that is in use
    pub fn proc_info(&self) -> Vec<ProcInfo> {
        self.procs
            .iter()
            .enumerate()
            .filter_map(|(slot, proc)| {
                let inner = proc.lock();
                if inner.state == ProcessState::Unused {
                    return None;
                }
                let queued = self.queues.lock().level_of(slot);
                Some(self.info_of(slot, &inner, queued))
            })
            .collect()
    }

    /// Snapshot of the process with `pid`
    pub fn info(&self, pid: ProcessId) -> Option<ProcInfo> {
        self.proc_info().into_iter().find(|info| info.pid == pid)
    }

    /// Print the process list to the kernel log
    ///
    /// Never blocks: a slot whose lock is held is reported as busy, so the
    /// listing still works on a wedged machine.
    ///
    /// # Returns
    ///
    /// Number of slots listed.
    pub fn procdump(&self) -> usize {
        let mut listed = 0;
        log::info!("[Procdump] ----");

        for (slot, proc) in self.procs.iter().enumerate() {
            let Some(inner) = proc.try_lock() else {
                log::info!("[Procdump] slot {} busy", slot);
                listed += 1;
                continue;
            };
            if inner.state == ProcessState::Unused {
                continue;
            }

            let queued = self.queues.try_lock().and_then(|queues| queues.level_of(slot));
            log::info!("[Procdump] {}", self.info_of(slot, &inner, queued));
            listed += 1;
        }

        listed
    }
}
