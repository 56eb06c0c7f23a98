/*
 * User Trap Frame
 *
 * The register image of a process's user-mode execution, saved by the
 * trap layer on every entry into the kernel and restored on the way out.
 * It lives in the process's dedicated trap-frame page, which is mapped
 * into the user address space so the trap entry code can reach it before
 * it has switched to the kernel's page tables.
 *
 * The scheduler only touches it in three places: fork copies the parent's
 * frame and zeroes the child's return register, userinit points the first
 * process at its code, and the syscall layer reads arguments from it and
 * writes the result back.
 *
 * Memory layout: general purpose registers first, then the interrupt
 * frame in the order the CPU pushes it. The trap entry assembly depends on
 * the order; do not reorder fields.
 */

/// Hardware interrupt frame (pushed by the CPU on trap entry)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptFrame {
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Saved user registers of one process
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    pub iret_frame: InterruptFrame,
}

impl TrapFrame {
    /// RFLAGS for a fresh user process: interrupts enabled, reserved bit 1 set
    pub const USER_RFLAGS: u64 = 0x202;

    /// Syscall number register
    pub fn syscall_number(&self) -> usize {
        self.rax as usize
    }

    /// Syscall argument `n` (System V order: rdi, rsi, rdx, r10, r8, r9)
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.r10,
            4 => self.r8,
            5 => self.r9,
            _ => panic!("syscall argument {} out of range", n),
        }
    }

    /// Store a syscall or fork return value
    pub fn set_return(&mut self, value: isize) {
        self.rax = value as u64;
    }
}
