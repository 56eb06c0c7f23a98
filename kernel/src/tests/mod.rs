/*
 * Test Suite for the MLFQ Kernel
 *
 * Whole-machine scenarios run on the hosted back-end. Each test boots its
 * own `sim::Machine` (a scheduler over the simulated platform), creates
 * init with a Rust closure as its "user program", and drives the dispatch
 * loop from the test thread.
 *
 * Programs report back over `std::sync::mpsc` channels and never assert
 * themselves: a panic on a process thread stops the whole test binary.
 *
 * ## Modules
 *
 * - `sim` - simulated platform and machine
 * - `lifecycle_tests` - fork / exit / wait / kill and resource accounting
 * - `dispatch_tests` - level priority, FIFO order, sleep/wakeup, multi-CPU
 * - `syscall_tests` - nice, startlog and getlog through the syscall layer
 */

#![cfg(not(target_os = "none"))]


mod dispatch_tests;
mod lifecycle_tests;
