/*
 * Kernel Logging System
 *
 * This module implements the kernel's `log` backend. Every subsystem logs
 * through the `log` facade (`log::info!`, `log::debug!`, ...) with a
 * "[Subsystem]" prefix; this logger adds the level tag and hands each
 * finished line to a `LogSink`.
 *
 * Why this is important:
 * - Scheduler decisions and lifecycle transitions are visible while the
 *   machine runs, at a verbosity chosen at boot
 * - Subsystems only depend on the `log` facade, never on an output device
 * - The kernel binary chooses where lines go (serial port on hardware,
 *   stderr on a development host)
 *
 * Lines are formatted into a fixed-size buffer, so logging never
 * allocates and can be used while holding spin locks. Overlong lines are
 * truncated.
 */

use core::fmt::Write;

use heapless::String;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

/// Maximum length of one formatted log line
pub const LINE_CAPACITY: usize = 256;

/// Destination of finished log lines
pub trait LogSink: Sync {
    fn write_line(&self, line: &str);
}

/// Custom logger implementation for the kernel.
struct KernelLogger {
    sink: spin::Once<&'static dyn LogSink>,
}

impl log::Log for KernelLogger {
    /// Checks if the given log level is enabled.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats the record and passes it to the sink.
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = self.sink.get() {
            sink.write_line(format_line(record).as_str());
        }
    }

    /// Flushes the logger (no-op in this case).
    fn flush(&self) {}
}

/// The KernelLogger instance used for logging.
static LOGGER: KernelLogger = KernelLogger { sink: spin::Once::new() };

/// Format one record as "[LEVEL] message"
pub fn format_line(record: &Record) -> String<LINE_CAPACITY> {
    let mut line = String::new();
    // A full buffer only truncates the line.
    let _ = write!(line, "[{}] {}", record.level(), record.args());
    line
}

/// Initializes the logger.
///
/// # Arguments
///
/// * `sink` - where formatted lines are written
/// * `level` - most verbose level that is let through
///
/// # Returns
///
/// `Err` if a logger was already installed.
pub fn init(sink: &'static dyn LogSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.sink.call_once(|| sink);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

/// Sink writing to the host's stderr
#[cfg(not(target_os = "none"))]
pub struct StderrSink;

#[cfg(not(target_os = "none"))]
impl LogSink for StderrSink {
    fn write_line(&self, line: &str) {
        std::eprintln!("{}", line);
    }
}
