/*
 * System Call Handlers
 *
 * This module implements the handler functions of the scheduler-facing
 * system calls. Each handler:
 * - Performs the requested operation on behalf of the calling process
 * - Returns its result, or a negative error code
 *
 * User pointers are never dereferenced here: copies to user memory go
 * through the platform, which checks the mapping.
 */

use super::numbers::*;
use crate::scheduler::{LogEntry, Scheduler};

/// Adjust the caller's nice value by `delta`
pub fn sys_nice(sched: &Scheduler, delta: i32) -> isize {
    sched.adjust_nice(delta).get() as isize
}

/// Start a logging session
pub fn sys_startlog(sched: &Scheduler) -> isize {
    match sched.event_log().start() {
        Ok(()) => 0,
        Err(err) => {
            log::debug!("startlog refused: {}", err);
            -err.errno()
        }
    }
}

/// Copy the recorded entries to `buf`
///
/// `buf` must have room for `LOG_SIZE` entries.
pub fn sys_getlog(sched: &Scheduler, buf: usize) -> isize {
    let entries = sched.event_log().snapshot();

    for (i, entry) in entries.iter().enumerate() {
        let addr = match buf.checked_add(i * LogEntry::SIZE) {
            Some(addr) => addr,
            None => return -EFAULT,
        };
        if let Err(err) = sched.copy_to_user(addr, &entry.to_bytes()) {
            return -err.errno();
        }
    }

    entries.len() as isize
}
