/*
 * Scheduler Type Definitions
 *
 * This module defines the small value types used throughout the scheduler
 * subsystem: identifiers, the queue level, the user-visible nice value and
 * sleep channels. They are lightweight, Copy-able and carry their own
 * conversion rules so that no other module hard-codes thresholds.
 */

use core::cmp::Ordering;

/// CPU identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl CpuId {
    /// Bootstrap processor (CPU 0)
    pub const BSP: CpuId = CpuId(0);

    /// Get the CPU ID as a usize for indexing
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Index of a process slot in the process table
pub type SlotId = usize;

/// Queue level
///
/// Three levels, `High` dispatched first. The discriminant is the level
/// number used in diagnostics (0 = lowest).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl Level {
    /// Levels in dispatch order (highest first)
    pub const DESCENDING: [Level; 3] = [Level::High, Level::Normal, Level::Low];

    /// Levels in numeric order
    pub const ALL: [Level; 3] = [Level::Low, Level::Normal, Level::High];

    /// Level a process with the given nice value belongs in
    ///
    /// nice <= -10 is High, nice <= 10 is Normal, anything above is Low.
    pub fn from_nice(nice: Nice) -> Level {
        match nice.get() {
            n if n <= -10 => Level::High,
            n if n <= 10 => Level::Normal,
            _ => Level::Low,
        }
    }

    /// Level number (0 = lowest)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Run budget of the level in ticks
    ///
    /// Reported by the process listing; the dispatcher does not demote
    /// processes that exceed it.
    pub fn quantum_ticks(self) -> u32 {
        match self {
            Level::Low => 15,
            Level::Normal => 10,
            Level::High => 1,
        }
    }
}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl core::fmt::Display for Level {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "L{}", self.index())
    }
}

/// Priority tunable ("nice"), lower is more favorable
///
/// Always within `[MIN, MAX]`; adjustments saturate at the bounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Nice(i32);

impl Nice {
    pub const MIN: i32 = -20;
    pub const MAX: i32 = 19;

    /// Clamp a raw value into range
    pub fn new(value: i32) -> Self {
        Nice(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> i32 {
        self.0
    }

    /// Add `delta`, clamping the result (never overflows)
    pub fn adjust(self, delta: i32) -> Self {
        Nice::new(self.0.saturating_add(delta))
    }
}

/// Sleep channel
///
/// An opaque token compared for equality. By convention it is the address
/// of the object being waited on, which makes distinct objects distinct
/// channels without any registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Channel(usize);

impl Channel {
    /// Channel named by an arbitrary token
    pub const fn new(token: usize) -> Self {
        Channel(token)
    }

    /// Channel named by the address of `object`
    pub fn of<T: ?Sized>(object: &T) -> Self {
        Channel(object as *const T as *const () as usize)
    }
}
