/*
 * Kernel Utilities
 */

pub mod logger;

pub use self::logger::*;
