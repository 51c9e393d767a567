//! Server configuration.

use std::time::Duration;

/// Room coordination policy knobs, filled from CLI flags in the binary.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Maximum members per room. A join against a full room is rejected with
    /// `room-full`.
    pub room_capacity: usize,
    /// Retention window for emptied rooms. `None` removes a room the moment
    /// its last member leaves; `Some(d)` keeps it for `d`, deleting only if
    /// it is still empty afterwards.
    pub empty_room_grace: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            room_capacity: 10,
            empty_room_grace: None,
        }
    }
}
