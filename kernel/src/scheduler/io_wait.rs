/*
 * Sleep / Wakeup
 *
 * This module provides the blocking primitive every wait in the kernel is
 * built on, plus the clock tick channel.
 *
 * ## Channels
 *
 * A process sleeps on a `Channel`, an opaque token that by convention is
 * the address of the thing it waits for (a child slot, the tick counter,
 * a buffer). `wakeup(chan)` makes every process sleeping on `chan`
 * Runnable again. Waking is level-free: a woken process re-checks its
 * condition and may sleep again.
 *
 * ## No lost wakeups
 *
 * The sleeper checks its condition while holding some lock `lk` and
 * passes the held guard to `sleep`. `sleep` takes the caller's slot lock
 * before releasing `lk`, and the waker changes the condition under `lk`
 * before calling `wakeup`, which needs the sleeper's slot lock to change
 * its state. So the wakeup either happens before the sleeper checked the
 * condition, or finds it Sleeping.
 *
 * ## Usage Example
 *
 * ```ignore
 * let mut guard = buffer.lock();
 * while guard.is_empty() {
 *     guard = sched.sleep(Channel::of(&buffer), guard);
 * }
 *
 * // producer
 * buffer.lock().push(byte);
 * sched.wakeup(Channel::of(&buffer));
 * ```
 */

use super::process::ProcessState;
use super::scheduler::Scheduler;
use super::types::Channel;
use crate::error::KernelError;
use crate::sync::SpinLockGuard;

impl Scheduler {
    /// Atomically release `guard`'s lock and sleep on `chan`
    ///
    /// Reacquires the same lock before returning.
    ///
    /// # Panics
    ///
    /// If called outside a process, or with the caller's own slot lock.
    pub fn sleep<'a, T>(&self, chan: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let (_, proc) = self.current();
        let lock = SpinLockGuard::source(&guard);

        // Once we hold our slot lock, no wakeup can be missed: wakeup locks
        // the slot before looking at our state.
        let mut p = proc.lock();
        drop(guard);

        p.chan = Some(chan);
        p.state = ProcessState::Sleeping;

        self.sched(proc, &p);

        p.chan = None;
        drop(p);

        lock.lock()
    }

    /// Wake every process sleeping on `chan`
    ///
    /// Must be called without holding any slot lock.
    pub fn wakeup(&self, chan: Channel) {
        let me = self.current_slot();

        for (slot, proc) in self.procs.iter().enumerate() {
            if Some(slot) == me {
                continue;
            }

            let mut p = proc.lock();
            if p.state == ProcessState::Sleeping && p.chan == Some(chan) {
                p.state = ProcessState::Runnable;
                self.enqueue(slot);
            }
        }
    }

    /// Channel tick sleepers wait on
    pub fn tick_channel(&self) -> Channel {
        Channel::of(&self.ticks)
    }

    /// Advance the clock by one tick
    ///
    /// Called by the timer interrupt path of one CPU.
    pub fn clock_tick(&self) {
        let _time = self.tick_lock.lock();
        self.ticks.fetch_add(1, core::sync::atomic::Ordering::AcqRel);
        self.wakeup(self.tick_channel());
    }

    /// Block the calling process for `n` clock ticks
    ///
    /// # Returns
    ///
    /// `Killed` if the process is killed before the time is up.
    pub fn sleep_ticks(&self, n: u64) -> Result<(), KernelError> {
        let mut time = self.tick_lock.lock();
        let start = self.ticks();

        while self.ticks() - start < n {
            if self.killed() {
                return Err(KernelError::Killed);
            }
            time = self.sleep(self.tick_channel(), time);
        }

        drop(time);
        Ok(())
    }
}
