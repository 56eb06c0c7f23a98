/*
 * x86_64 Bare-Metal Back-End
 *
 * Interrupt control, CPU identification and kernel context switching for
 * the hardware build.
 *
 * Context switching only saves callee-saved registers: `swtch` is called
 * as an ordinary function, so the compiler has already spilled everything
 * the System V ABI lets a callee clobber. The return address sits on the
 * stack, so restoring rsp and executing `ret` resumes the other context
 * right after its own call to `swtch`.
 *
 * A fresh context has a stack prepared so that its first `ret` lands in
 * `context_entry`, which calls the Rust entry point with the argument
 * stashed in r12/r13.
 */

use core::arch::naked_asm;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ::x86_64::instructions::interrupts;

use super::EntryPoint;
use crate::config::NCPU;

/// Saved kernel execution context (callee-saved registers and stack pointer)
///
/// Field offsets are used by `swtch`; do not reorder.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Context {
    rsp: u64, // 0x00
    r15: u64, // 0x08
    r14: u64, // 0x10
    r13: u64, // 0x18
    r12: u64, // 0x20
    rbx: u64, // 0x28
    rbp: u64, // 0x30
}

impl Context {
    /// Prepare a context that starts executing `entry(arg)` on the given stack
    ///
    /// # Safety
    ///
    /// `stack_top` must be the top of a mapped, writable kernel stack that
    /// no other context is using.
    pub unsafe fn new(entry: EntryPoint, arg: usize, stack_top: usize) -> Self {
        // After `ret` pops the trampoline rsp is 16-byte aligned, as the ABI
        // requires right before the trampoline's `call`.
        let rsp = (stack_top & !0xf) - 24;
        unsafe {
            (rsp as *mut u64).write(context_entry as usize as u64);
        }

        Self {
            rsp: rsp as u64,
            r12: entry as usize as u64,
            r13: arg as u64,
            ..Self::default()
        }
    }
}

/// Save the current context into `old` and resume `new`
///
/// # Safety
///
/// `old` must be writable and `new` must hold a context saved by `swtch`
/// or prepared by `Context::new`. Interrupts must be disabled.
#[unsafe(naked)]
pub unsafe extern "C" fn swtch(old: *mut Context, new: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x30], rbp",

        "mov rsp, [rsi + 0x00]",
        "mov r15, [rsi + 0x08]",
        "mov r14, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov rbx, [rsi + 0x28]",
        "mov rbp, [rsi + 0x30]",
        "ret",
    )
}

/// Resume `new` for good, abandoning the current context
///
/// # Safety
///
/// As for `swtch`. Nothing may resume `old` again until it is replaced
/// with a fresh `Context`.
pub unsafe fn swtch_exit(old: *mut Context, new: *const Context) -> ! {
    unsafe {
        swtch(old, new);
    }
    panic!("swtch_exit: abandoned context resumed");
}

/// First instruction a fresh context executes
#[unsafe(naked)]
unsafe extern "C" fn context_entry() -> ! {
    naked_asm!(
        "mov rdi, r12",
        "mov rsi, r13",
        "call {enter}",
        "ud2",
        enter = sym enter_context,
    )
}

extern "C" fn enter_context(entry: usize, arg: usize) -> ! {
    // SAFETY: r12 was loaded from an `EntryPoint` in `Context::new`.
    let entry: EntryPoint = unsafe { core::mem::transmute(entry) };
    entry(arg)
}

// ============================================================================
// INTERRUPTS AND PER-CPU STATE
// ============================================================================

/// Interrupt nesting state of one CPU, only touched by that CPU
struct CpuFlags {
    /// Depth of `push_off` nesting
    noff: AtomicU32,
    /// Were interrupts enabled before the outermost `push_off`?
    intena: AtomicBool,
}

impl CpuFlags {
    const fn new() -> Self {
        Self {
            noff: AtomicU32::new(0),
            intena: AtomicBool::new(false),
        }
    }
}

static CPU_FLAGS: [CpuFlags; NCPU] = [const { CpuFlags::new() }; NCPU];

/// Per-CPU bring-up; the hardware id comes from CPUID so nothing to record
pub fn init_cpu(_id: usize) {}

pub fn intr_on() {
    interrupts::enable();
}

pub fn intr_off() {
    interrupts::disable();
}

pub fn intr_get() -> bool {
    interrupts::are_enabled()
}

/// Index of the executing CPU
///
/// Only stable while interrupts are disabled.
pub fn cpu_id() -> usize {
    // CPUID leaf 1 -> EBX[31:24] = local APIC id
    #[allow(unused_unsafe)]
    let apic_id = (unsafe { core::arch::x86_64::__cpuid(1) }.ebx >> 24) as usize;
    if apic_id >= NCPU {
        panic!("cpu_id: APIC id {} beyond NCPU", apic_id);
    }
    apic_id
}

pub fn noff() -> u32 {
    CPU_FLAGS[cpu_id()].noff.load(Ordering::Relaxed)
}

pub fn set_noff(depth: u32) {
    CPU_FLAGS[cpu_id()].noff.store(depth, Ordering::Relaxed);
}

pub fn intena() -> bool {
    CPU_FLAGS[cpu_id()].intena.load(Ordering::Relaxed)
}

pub fn set_intena(enabled: bool) {
    CPU_FLAGS[cpu_id()].intena.store(enabled, Ordering::Relaxed);
}

/// Called by an idle dispatch loop iteration
pub fn idle_hint() {
    core::hint::spin_loop();
}
