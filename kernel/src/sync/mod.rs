/*
 * Kernel Synchronization
 *
 * Interrupt-safe spin locks for data shared between CPUs and between
 * process context and interrupt context.
 */

pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
