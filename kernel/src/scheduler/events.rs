/*
 * Scheduling Event Log
 *
 * A fixed-capacity record of dispatch decisions for user-space analysis.
 * While logging is active the dispatch loop appends one `(pid, tick)`
 * entry per dispatch; when the buffer fills, logging switches itself off
 * and the entries stay frozen until a new session is started.
 *
 * Session rules:
 * - `start` fails with `AlreadyLogging` while a session is recording
 * - starting after a completed session discards it and begins a new one
 * - `snapshot` may be called at any time and returns what has been
 *   recorded so far
 *
 * The log has its own spin lock. It is a leaf in the lock order: the
 * dispatch loop records while holding a slot lock.
 */

use heapless::Vec;

use super::process::ProcessId;
use crate::config::LOG_SIZE;
use crate::error::KernelError;
use crate::sync::SpinLock;

/// One dispatch decision
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub pid: i32,
    pub time: i32,
}

impl LogEntry {
    /// Size of the user-visible encoding
    pub const SIZE: usize = 8;

    pub fn new(pid: ProcessId, tick: u64) -> Self {
        Self {
            pid: pid.as_usize() as i32,
            time: tick as i32,
        }
    }

    /// User-visible encoding: pid then time, both little-endian i32
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..4].copy_from_slice(&self.pid.to_le_bytes());
        bytes[4..].copy_from_slice(&self.time.to_le_bytes());
        bytes
    }
}

struct LogState {
    active: bool,
    entries: Vec<LogEntry, LOG_SIZE>,
}

/// Dispatch event log
pub struct EventLog {
    state: SpinLock<LogState>,
}

impl EventLog {
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new("eventlog", LogState { active: false, entries: Vec::new() }),
        }
    }

    /// Begin recording
    pub fn start(&self) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        if state.active {
            return Err(KernelError::AlreadyLogging);
        }

        state.entries.clear();
        state.active = true;
        log::info!("[EventLog] Recording started (capacity {})", LOG_SIZE);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Append one dispatch if recording; stops recording when full
    ///
    /// `clock` is read under the log lock, so timestamps never decrease
    /// from one entry to the next however CPUs race to record.
    ///
    /// # Panics
    ///
    /// If an active log has no room left.
    pub fn record(&self, pid: ProcessId, clock: impl FnOnce() -> u64) {
        let mut state = self.state.lock();
        if !state.active {
            return;
        }

        let entry = LogEntry::new(pid, clock());
        if state.entries.push(entry).is_err() {
            panic!("eventlog overflow");
        }
        if state.entries.is_full() {
            state.active = false;
            log::info!("[EventLog] Buffer full, recording stopped");
        }
    }

    /// Entries recorded so far in the current or last session
    pub fn snapshot(&self) -> Vec<LogEntry, LOG_SIZE> {
        self.state.lock().entries.clone()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
