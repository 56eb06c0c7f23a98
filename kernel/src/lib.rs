/*
 * MLFQ Kernel Library Root
 *
 * This crate contains the process scheduler of a small Unix-like kernel
 * together with the process lifecycle that feeds and drains its queues.
 * It is linked by the kernel binary, which supplies the machine-facing
 * collaborators (page allocator, virtual memory, file system, trap layer)
 * through the `Platform` trait.
 *
 * Why this is important:
 * - Keeps the scheduling policy and the process table in one place
 * - Lets the same scheduler code run on bare metal and on a simulated
 *   machine on a development host (see `arch`)
 * - Exposes only the narrow interfaces the rest of the kernel needs
 *
 * Layout:
 * - `arch`      - interrupt control, per-CPU nesting counters, context switch
 * - `sync`      - interrupt-safe spin lock built on `spin`
 * - `scheduler` - queue table, process table, lifecycle, dispatch loop, log
 * - `syscall`   - the scheduler-facing system calls
 * - `platform`  - contracts of the external collaborators
 * - `config`    - compile-time limits and runtime scheduler configuration
 * - `error`     - kernel error type
 * - `utils`     - kernel logger
 */

#![no_std]

extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;

pub mod arch;
pub mod config;
pub mod error;
pub mod platform;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::SchedulerConfig;
pub use error::KernelError;
pub use platform::Platform;
pub use scheduler::{ProcessId, ProcessState, Scheduler};
