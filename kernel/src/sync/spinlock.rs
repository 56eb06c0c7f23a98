/*
 * Interrupt-Safe Spin Lock
 *
 * `SpinLock<T>` wraps a `spin::Mutex<T>` with the rules a kernel lock
 * needs on top of mutual exclusion:
 *
 * - Interrupts stay disabled on the owning CPU for as long as the lock is
 *   held (`arch::push_off` on acquire, `arch::pop_off` on release), so an
 *   interrupt handler can never spin on a lock its own CPU holds.
 * - The owning CPU is recorded, which makes `holding()` answerable and
 *   turns recursive acquisition into an immediate panic instead of a
 *   silent deadlock.
 *
 * Locks held across a context switch:
 * A process slot lock is acquired on one side of `swtch` and released on
 * the other. The guard on each side simply drops when its code resumes;
 * whichever guard drops releases whatever acquisition is current, which is
 * always the one made by the context that switched away. The one guard
 * that has no owner on the resuming side (a brand new process) is covered
 * by `force_release`.
 */

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch;

const NO_OWNER: usize = usize::MAX;

/// Spin lock that disables interrupts while held
pub struct SpinLock<T> {
    /// Name used in panic messages
    name: &'static str,

    /// CPU currently holding the lock, or NO_OWNER
    owner: AtomicUsize,

    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    /// Create an unlocked spin lock
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            owner: AtomicUsize::new(NO_OWNER),
            inner: spin::Mutex::new(value),
        }
    }

    /// Acquire the lock, spinning until it is free
    ///
    /// # Panics
    ///
    /// If the executing CPU already holds this lock.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        arch::push_off();
        if self.holding() {
            panic!("acquire {}", self.name);
        }

        let guard = self.inner.lock();
        self.owner.store(arch::cpu_id(), Ordering::Release);

        SpinLockGuard { lock: self, guard: ManuallyDrop::new(guard) }
    }

    /// Acquire the lock only if it is free right now
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        arch::push_off();
        if !self.holding() {
            if let Some(guard) = self.inner.try_lock() {
                self.owner.store(arch::cpu_id(), Ordering::Release);
                return Some(SpinLockGuard { lock: self, guard: ManuallyDrop::new(guard) });
            }
        }
        arch::pop_off();
        None
    }

    /// Is this lock held by the executing CPU?
    ///
    /// Interrupts must be off for the answer to stay true.
    pub fn holding(&self) -> bool {
        self.inner.is_locked() && self.owner.load(Ordering::Acquire) == arch::cpu_id()
    }

    /// Lock name, as given to `new`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Release an acquisition whose guard lives in another context
    ///
    /// # Safety
    ///
    /// The executing CPU must hold the lock, and the guard that acquired it
    /// must never be dropped.
    pub unsafe fn force_release(&self) {
        if !self.holding() {
            panic!("release {}", self.name);
        }
        self.owner.store(NO_OWNER, Ordering::Release);
        unsafe {
            self.inner.force_unlock();
        }
        arch::pop_off();
    }
}

/// RAII guard of a held `SpinLock`
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
}

impl<'a, T> SpinLockGuard<'a, T> {
    /// The lock this guard holds
    ///
    /// An associated function so it never shadows a method of `T`.
    pub fn source(this: &Self) -> &'a SpinLock<T> {
        this.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        if !self.lock.holding() {
            panic!("release {}", self.lock.name);
        }
        self.lock.owner.store(NO_OWNER, Ordering::Release);
        // SAFETY: dropped exactly once, here.
        unsafe {
            ManuallyDrop::drop(&mut self.guard);
        }
        arch::pop_off();
    }
}
