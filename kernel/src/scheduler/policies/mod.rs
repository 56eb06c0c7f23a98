/*
 * Scheduling Policies Module
 *
 * This module contains the queueing structures that decide which process
 * runs next. The dispatch loop in `sched_core` owns one `QueueTable` and
 * drives it; the table itself knows nothing about locks or processes.
 *
 * Available policies:
 * - Mlfq: three-level multi-level feedback queue with periodic re-leveling
 */

pub mod mlfq;

pub use mlfq::QueueTable;
