/*
 * Multi-Level Feedback Queue Scheduler
 *
 * This module implements process scheduling for the kernel: a three-level
 * MLFQ that picks the next process per CPU, and the process lifecycle that
 * feeds and drains its queues.
 *
 * SCHEDULING EXPLAINED:
 * =====================
 *
 * Every Runnable process sits in exactly one of three FIFO queues:
 *
 *   Level 2 (High)    nice <= -10
 *   Level 1 (Normal)  -10 < nice <= 10
 *   Level 0 (Low)     nice > 10
 *
 * The dispatch loop always takes the oldest process of the highest
 * non-empty level. A process chooses its level through its nice value
 * (syscall `nice`); it enters the matching queue whenever it becomes
 * Runnable, and every RELEVEL_PERIOD ticks the re-leveler moves queued
 * processes whose nice value changed while they were waiting.
 *
 * PROCESS LIFECYCLE:
 * ==================
 *
 *   Unused -> Used -> Runnable <-> Running -> Zombie -> Unused
 *                        ^            |
 *                        +- Sleeping <+
 *
 * - Used: slot claimed, resources being set up (fork / userinit)
 * - Runnable: in a queue, waiting for a CPU
 * - Running: on a CPU
 * - Sleeping: waiting on a channel (wait, tick sleep, I/O)
 * - Zombie: exited, waiting to be reaped by its parent
 *
 * CONTEXT SWITCHING:
 * ==================
 *
 * Each CPU has its own dispatch-loop context. A process never switches
 * directly to another process: it switches to its CPU's dispatch loop
 * (`sched`), which picks the next one. The process's slot lock is held
 * across every switch, so no other CPU can pick up a process whose
 * context is still being saved.
 *
 * EVENT LOG:
 * ==========
 *
 * User space can ask the kernel to record the next LOG_SIZE dispatch
 * decisions as (pid, tick) pairs (syscalls `startlog` / `getlog`), which
 * is how scheduling behavior is observed from user programs.
 *
 * Key features:
 * - Strict-priority three-level MLFQ with FIFO levels
 * - Periodic re-leveling driven by the clock
 * - Sleep/wakeup with no lost wakeups
 * - fork / exit / wait / kill with orphan reparenting to init
 * - SMP-safe: per-slot locks, one queue lock, one wait lock
 */

pub mod context;
pub mod events;
pub mod io_wait;
pub mod lifecycle;
pub mod policies;
pub mod process;
pub mod sched_core;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod types;

pub use context::TrapFrame;
pub use events::{EventLog, LogEntry};
pub use process::{ProcInfo, ProcessId, ProcessState};
pub use scheduler::Scheduler;
pub use types::{Channel, CpuId, Level, Nice, SlotId};
