/*
 * Kernel Configuration
 *
 * Compile-time limits shared by every subsystem, and the runtime
 * configuration handed to `Scheduler::new`.
 *
 * The constants size fixed tables (per-CPU state, the event log, the open
 * file array). `SchedulerConfig` chooses how much of those tables a given
 * boot actually uses, so a test can boot a tiny machine with four process
 * slots and one CPU while the hardware build uses the full defaults.
 */

/// Default number of process slots
pub const NPROC: usize = 64;

/// Maximum number of CPUs the per-CPU tables are sized for
pub const NCPU: usize = 8;

/// Open files per process
pub const NOFILE: usize = 16;

/// Capacity of the scheduling event log
pub const LOG_SIZE: usize = 100;

/// Ticks between two runs of the priority re-leveler
pub const RELEVEL_PERIOD: u64 = 60;

/// Size of one physical page
pub const PAGE_SIZE: usize = 4096;

/// Maximum length of a process name in bytes
pub const PROC_NAME_LEN: usize = 16;

/// Runtime scheduler configuration
///
/// `Default` gives the hardware configuration: `NPROC` slots, a single CPU,
/// re-leveling every `RELEVEL_PERIOD` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of process slots in the process table
    pub nproc: usize,

    /// Number of CPUs running the dispatch loop
    pub ncpu: usize,

    /// Ticks between two re-leveler runs
    pub relevel_period: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            nproc: NPROC,
            ncpu: 1,
            relevel_period: RELEVEL_PERIOD,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with the given table sizes and default everything else
    pub fn with_size(nproc: usize, ncpu: usize) -> Self {
        Self { nproc, ncpu, ..Self::default() }
    }

    /// Check that the configuration fits the compile-time tables
    ///
    /// # Returns
    ///
    /// `Err` with a short description of the first offending field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.nproc == 0 {
            return Err("nproc must be at least 1");
        }
        if self.ncpu == 0 || self.ncpu > NCPU {
            return Err("ncpu must be between 1 and NCPU");
        }
        if self.relevel_period == 0 {
            return Err("relevel_period must be non-zero");
        }
        Ok(())
    }
}
