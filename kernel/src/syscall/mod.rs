/*
 * System Call Dispatch
 *
 * The trap layer saves the user registers in the process's trap frame and
 * calls `handle_syscall`. This module reads the syscall number and
 * arguments from the frame, runs the handler, and stores the result back
 * in RAX for the return to user mode.
 *
 * System V ABI Calling Convention:
 * =================================
 *
 * Arguments:
 * - RAX: Syscall number
 * - RDI: Arg 1
 * - RSI: Arg 2
 * - RDX: Arg 3
 * - R10: Arg 4
 * - R8:  Arg 5
 * - R9:  Arg 6
 *
 * Return:
 * - RAX: Return value (negative = error code)
 */

pub mod handlers;
pub mod numbers;

use handlers::*;
use numbers::*;

use crate::scheduler::Scheduler;

/// Run syscall `syscall_num` with raw register arguments
pub fn dispatch(sched: &Scheduler, syscall_num: usize, args: [u64; 6]) -> isize {
    log::debug!("Syscall {} called with args: {:#x}, {:#x}", syscall_num, args[0], args[1]);

    let ret = match syscall_num {
        SYS_NICE => sys_nice(sched, args[0] as i32),
        SYS_STARTLOG => sys_startlog(sched),
        SYS_GETLOG => sys_getlog(sched, args[0] as usize),
        _ => {
            log::warn!("Unknown syscall number: {}", syscall_num);
            -ENOSYS
        }
    };

    log::debug!("Syscall {} returning: {}", syscall_num, ret);
    ret
}

/// Handle the syscall saved in the calling process's trap frame
pub fn handle_syscall(sched: &Scheduler) {
    let (syscall_num, args) = sched.with_trapframe(|frame| {
        let args = core::array::from_fn(|n| frame.arg(n));
        (frame.syscall_number(), args)
    });

    let ret = dispatch(sched, syscall_num, args);

    sched.with_trapframe(|frame| frame.set_return(ret));
}
