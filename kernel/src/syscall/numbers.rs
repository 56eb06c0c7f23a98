/*
 * System Call Numbers
 *
 * Numbers and error codes of the scheduler-facing system calls.
 *
 * Syscall Mechanism:
 * - RAX register contains syscall number
 * - Arguments in RDI, RSI, RDX, R10, R8, R9 (6 args max)
 * - Return value in RAX (signed: negative = error code)
 *
 * The numbers continue the classic xv6 table, which ends at 21.
 */

/// Syscall error codes (negative values returned in RAX)
pub const ESRCH: isize = 3;     // No such process
pub const EINTR: isize = 4;     // Interrupted (process killed)
pub const ECHILD: isize = 10;   // No child processes
pub const EAGAIN: isize = 11;   // Resource temporarily unavailable
pub const ENOMEM: isize = 12;   // Out of memory
pub const EFAULT: isize = 14;   // Bad address (invalid pointer from userspace)
pub const EBUSY: isize = 16;    // Resource busy (log already recording)
pub const EINVAL: isize = 22;   // Invalid argument
pub const EMFILE: isize = 24;   // Too many open files
pub const ENOSYS: isize = 38;   // Function not implemented

/// Adjust the caller's nice value
///
/// Arguments: (delta: i32) -> isize
/// Returns: the resulting nice value, clamped to [-20, 19]
pub const SYS_NICE: usize = 22;

/// Start recording dispatch decisions
///
/// Arguments: () -> isize
/// Returns: 0 on success, -EBUSY if already recording
pub const SYS_STARTLOG: usize = 23;

/// Copy the recorded dispatch decisions to user memory
///
/// Arguments: (buf: *mut LogEntry) -> isize
/// Returns: number of entries recorded (and copied), or -EFAULT
pub const SYS_GETLOG: usize = 24;
