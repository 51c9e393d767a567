//! Time utilities with a clock abstraction for testability.

use chrono::Utc;

/// Clock trait for dependency injection and testing.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in milliseconds (UTC).
    fn now_millis(&self) -> i64;
}

/// System clock implementation (uses actual system time).
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        unix_millis()
    }
}

/// Fixed clock implementation for testing (returns a fixed time).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: i64,
}

impl FixedClock {
    pub fn new(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: fixed_time_millis,
        }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.fixed_time
    }
}

/// Current Unix timestamp in milliseconds (UTC).
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}
