//! Shared utilities: logging and time.

pub mod logger;
pub mod time;
