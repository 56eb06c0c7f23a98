/*
 * Architecture Abstraction Layer
 *
 * This module provides the small set of machine primitives the scheduler
 * needs, behind one interface that every back-end implements:
 *
 * - interrupt enable flag control (`intr_on`, `intr_off`, `intr_get`)
 * - the identity of the executing CPU (`cpu_id`)
 * - per-CPU interrupt-disable nesting state (`noff`, `intena`)
 * - a saved execution `Context` and the `swtch` primitive that saves the
 *   current one and resumes another
 * - `swtch_exit`, the last switch of a context that never runs again
 *
 * Back-ends:
 * - `x86_64` - bare metal. Interrupt flag through the `x86_64` crate,
 *   CPU id from CPUID, callee-saved register switch in assembly.
 * - `hosted` - any OS target. A simulated machine where each execution
 *   context is a host thread and the "CPU" is a baton handed over on
 *   every switch. Used by the test suite.
 *
 * On top of the back-end primitives this module implements the nesting
 * discipline every spin lock relies on: `push_off` / `pop_off` are like
 * `intr_off` / `intr_on` except that they are matched, so two `push_off`
 * calls need two `pop_off` calls, and interrupts are only re-enabled if
 * they were enabled before the outermost `push_off`.
 */

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use self::x86_64::*;

#[cfg(not(target_os = "none"))]
mod hosted;
#[cfg(not(target_os = "none"))]
pub use self::hosted::*;

#[cfg(all(target_os = "none", not(target_arch = "x86_64")))]
compile_error!("no architecture back-end for this bare-metal target");

/// Function a fresh context starts in, called with the argument given to
/// `Context::new`. It must never return.
pub type EntryPoint = fn(usize) -> !;

/// Disable interrupts, remembering whether they were on at nesting level 0
pub fn push_off() {
    let old = intr_get();
    intr_off();

    let depth = noff();
    if depth == 0 {
        set_intena(old);
    }
    set_noff(depth + 1);
}

/// Undo one `push_off`
///
/// # Panics
///
/// If interrupts are enabled (someone re-enabled them under a lock) or if
/// there is no matching `push_off`.
pub fn pop_off() {
    if intr_get() {
        panic!("pop_off - interruptible");
    }

    let depth = noff();
    if depth < 1 {
        panic!("pop_off");
    }
    set_noff(depth - 1);

    if depth == 1 && intena() {
        intr_on();
    }
}
