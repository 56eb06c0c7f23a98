/*
 * Hosted Back-End (Simulated Machine)
 *
 * Runs the scheduler on a development host. Every kernel execution
 * context (a CPU's dispatch loop, a process's kernel thread) is a host
 * thread, and a simulated CPU is a value of `CpuState` that lives in the
 * thread-local slot of whichever thread currently executes on it.
 *
 * `swtch(old, new)` moves the CPU: it takes the state out of the calling
 * thread, hands it to the thread behind `new` (starting that thread the
 * first time a context is resumed), then parks until some CPU is handed
 * back through `old`. Exactly one thread runs per simulated CPU, so the
 * kernel code above sees the same one-context-per-CPU world it sees on
 * hardware, with real parallelism between CPUs.
 *
 * A context that will never be resumed leaves through `swtch_exit`
 * instead: it hands its CPU on and then unwinds its own thread, so an
 * exited process does not keep a parked host thread behind.
 *
 * The interrupt flag is only bookkeeping here: nothing asynchronous is
 * delivered, but the nesting rules are enforced exactly as on hardware.
 */

use std::cell::Cell;
use std::format;
use std::panic;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use super::EntryPoint;

/// State of one simulated CPU
#[derive(Debug, Clone, Copy)]
struct CpuState {
    id: usize,
    intr: bool,
    noff: u32,
    intena: bool,
}

std::thread_local! {
    static CPU: Cell<Option<CpuState>> = const { Cell::new(None) };
}

fn with_cpu<R>(f: impl FnOnce(&mut CpuState) -> R) -> R {
    CPU.with(|slot| {
        let mut state = slot
            .get()
            .unwrap_or_else(|| panic!("no simulated CPU on this thread (missing init_cpu?)"));
        let result = f(&mut state);
        slot.set(Some(state));
        result
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Make the calling host thread simulated CPU `id` (interrupts off)
pub fn init_cpu(id: usize) {
    CPU.with(|slot| {
        slot.set(Some(CpuState { id, intr: false, noff: 0, intena: false }));
    });
}

pub fn intr_on() {
    with_cpu(|cpu| cpu.intr = true);
}

pub fn intr_off() {
    with_cpu(|cpu| cpu.intr = false);
}

pub fn intr_get() -> bool {
    with_cpu(|cpu| cpu.intr)
}

pub fn cpu_id() -> usize {
    with_cpu(|cpu| cpu.id)
}

pub fn noff() -> u32 {
    with_cpu(|cpu| cpu.noff)
}

pub fn set_noff(depth: u32) {
    with_cpu(|cpu| cpu.noff = depth);
}

pub fn intena() -> bool {
    with_cpu(|cpu| cpu.intena)
}

pub fn set_intena(enabled: bool) {
    with_cpu(|cpu| cpu.intena = enabled);
}

/// Called by an idle dispatch loop iteration
pub fn idle_hint() {
    thread::yield_now();
}

// ============================================================================
// CONTEXTS
// ============================================================================

/// Hand-off point of a parked context
struct Baton {
    cpu: Mutex<Option<CpuState>>,
    ready: Condvar,
}

impl Baton {
    fn new() -> Self {
        Self { cpu: Mutex::new(None), ready: Condvar::new() }
    }

    fn hand(&self, cpu: CpuState) {
        let mut slot = lock(&self.cpu);
        *slot = Some(cpu);
        self.ready.notify_one();
    }

    fn take(&self) -> CpuState {
        let mut slot = lock(&self.cpu);
        loop {
            if let Some(cpu) = slot.take() {
                return cpu;
            }
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct ContextInner {
    /// Where the owning thread parks once it has switched away
    baton: Option<Arc<Baton>>,
    /// Entry point of a context that has never run
    entry: Option<(EntryPoint, usize)>,
}

/// Saved execution context: a parked host thread, or one not started yet
#[derive(Default)]
pub struct Context {
    inner: Mutex<ContextInner>,
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Context")
            .field("started", &inner.entry.is_none())
            .finish()
    }
}

impl Context {
    /// Prepare a context that starts executing `entry(arg)`
    ///
    /// # Safety
    ///
    /// Mirrors the hardware back-end; the stack is unused on a host.
    pub unsafe fn new(entry: EntryPoint, arg: usize, _stack_top: usize) -> Self {
        Self {
            inner: Mutex::new(ContextInner { baton: None, entry: Some((entry, arg)) }),
        }
    }

    fn baton(&self) -> Arc<Baton> {
        let mut inner = lock(&self.inner);
        inner.baton.get_or_insert_with(|| Arc::new(Baton::new())).clone()
    }

    fn resume(&self, cpu: CpuState) {
        let mut inner = lock(&self.inner);
        if let Some((entry, arg)) = inner.entry.take() {
            drop(inner);
            start_context(cpu, entry, arg);
        } else if let Some(baton) = inner.baton.clone() {
            drop(inner);
            baton.hand(cpu);
        } else {
            panic!("swtch: resuming a context that was never saved");
        }
    }
}

fn run_context(entry: EntryPoint, arg: usize) {
    entry(arg)
}

/// Unwind payload of a context leaving through `swtch_exit`
struct Retired;

fn start_context(cpu: CpuState, entry: EntryPoint, arg: usize) {
    let spawned = thread::Builder::new()
        .name(format!("sim-ctx-{:#x}", arg))
        .spawn(move || {
            CPU.with(|slot| slot.set(Some(cpu)));
            let outcome = panic::catch_unwind(move || run_context(entry, arg));
            // A real panic would leave its CPU parked forever; stop the machine.
            if !outcome.is_err_and(|payload| payload.is::<Retired>()) {
                std::process::abort();
            }
        });

    if let Err(err) = spawned {
        panic!("swtch: cannot start context thread: {}", err);
    }
}

/// Save the current context into `old` and resume `new`
///
/// Returns when some CPU resumes `old` again.
///
/// # Safety
///
/// Both pointers must be valid. `new` must have been prepared by
/// `Context::new` or saved by an earlier `swtch`.
pub unsafe fn swtch(old: *mut Context, new: *const Context) {
    let (old, new) = unsafe { (&*old, &*new) };

    let cpu = CPU
        .with(|slot| slot.take())
        .unwrap_or_else(|| panic!("swtch: no simulated CPU on this thread"));

    let parked = old.baton();
    new.resume(cpu);

    let cpu = parked.take();
    CPU.with(|slot| slot.set(Some(cpu)));
}

/// Resume `new` for good, abandoning the current context
///
/// The calling thread holds no CPU afterwards. It unwinds back to its
/// entry and ends; destructors still pending on its stack run without a
/// CPU, so none of them may touch a spin lock. Without unwinding the
/// thread parks forever instead.
///
/// # Safety
///
/// As for `swtch`. Nothing may resume `old` again until it is replaced
/// with a fresh `Context`.
pub unsafe fn swtch_exit(_old: *mut Context, new: *const Context) -> ! {
    let new = unsafe { &*new };

    let cpu = CPU
        .with(|slot| slot.take())
        .unwrap_or_else(|| panic!("swtch_exit: no simulated CPU on this thread"));
    new.resume(cpu);

    retire()
}

#[cfg(panic = "unwind")]
fn retire() -> ! {
    panic::resume_unwind(std::boxed::Box::new(Retired))
}

#[cfg(not(panic = "unwind"))]
fn retire() -> ! {
    loop {
        thread::park();
    }
}
