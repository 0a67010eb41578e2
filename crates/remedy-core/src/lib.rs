//! Foundational low-level utilities shared across remedy crates.
//!
//! Provides the atomic file-write helper used by config materialization and
//! the timestamp helper backing its temp-file naming.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::current_unix_timestamp;
