/*
 * Kernel Error Type
 *
 * Errors reported to callers of the process lifecycle and the event log.
 * Invariant violations are not represented here: they halt the kernel
 * with a panic naming the broken condition.
 */

use crate::syscall::numbers;

/// Errors returned by scheduler and lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Every process slot is in use
    NoFreeProc,
    /// A page or address space could not be allocated
    OutOfMemory,
    /// `wait` was called by a process without children
    NoChildren,
    /// The calling process has a pending kill request
    Killed,
    /// No process has the given pid
    NoSuchProcess,
    /// A copy to user memory hit an unmapped or read-only address
    BadAddress,
    /// Every file descriptor of the process is in use
    TooManyFiles,
    /// The event log is already recording
    AlreadyLogging,
    /// The scheduler configuration was rejected
    InvalidConfig(&'static str),
}

impl KernelError {
    /// Errno value (positive) reported to user space for this error
    pub fn errno(self) -> isize {
        match self {
            KernelError::NoFreeProc => numbers::EAGAIN,
            KernelError::OutOfMemory => numbers::ENOMEM,
            KernelError::NoChildren => numbers::ECHILD,
            KernelError::Killed => numbers::EINTR,
            KernelError::NoSuchProcess => numbers::ESRCH,
            KernelError::BadAddress => numbers::EFAULT,
            KernelError::TooManyFiles => numbers::EMFILE,
            KernelError::AlreadyLogging => numbers::EBUSY,
            KernelError::InvalidConfig(_) => numbers::EINVAL,
        }
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::NoFreeProc => write!(f, "No free process slot"),
            KernelError::OutOfMemory => write!(f, "Out of memory"),
            KernelError::NoChildren => write!(f, "No child processes"),
            KernelError::Killed => write!(f, "Process was killed"),
            KernelError::NoSuchProcess => write!(f, "No such process"),
            KernelError::BadAddress => write!(f, "Bad user address"),
            KernelError::TooManyFiles => write!(f, "Too many open files"),
            KernelError::AlreadyLogging => write!(f, "Event log already active"),
            KernelError::InvalidConfig(why) => write!(f, "Invalid configuration: {}", why),
        }
    }
}
