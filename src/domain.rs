//! Domain model: connections, members, and rooms.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Process-unique identifier for one client connection, assigned by the
/// gateway on accept and never reused within the process lifetime.
///
/// A member is identified by the id of the connection that joined it, so the
/// same type names both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Push-to-talk state of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Silent,
    Talking,
}

/// A user's membership record within one room.
#[derive(Debug, Clone)]
pub struct Member {
    pub display_name: String,
    pub audio_state: AudioState,
    pub joined_at: i64,
}

/// Why a join request was rejected. Reported to the requester only; none of
/// these mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("display name already taken in this room")]
    NameTaken,
    #[error("room is at capacity")]
    RoomFull,
}

/// Why a relay request was dropped. Never surfaced to the sender; signaling
/// races are expected under normal churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("sender has not joined a room")]
    NotJoined,
    #[error("target is not a member of the sender's room")]
    UnauthorizedTarget,
    #[error("target has already left")]
    StaleTarget,
}

/// A named group of simultaneously-connected members.
#[derive(Debug, Clone)]
pub struct Room {
    pub created_at: i64,
    members: HashMap<ConnectionId, Member>,
    capacity: usize,
    /// Set when the last member leaves and a grace window is configured;
    /// cleared on re-join.
    pub emptied_at: Option<i64>,
}

impl Room {
    pub fn new(created_at: i64, capacity: usize) -> Self {
        Self {
            created_at,
            members: HashMap::new(),
            capacity,
            emptied_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, id: &ConnectionId) -> Option<&Member> {
        self.members.get(id)
    }

    pub fn member_mut(&mut self, id: &ConnectionId) -> Option<&mut Member> {
        self.members.get_mut(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn members(&self) -> impl Iterator<Item = (&ConnectionId, &Member)> {
        self.members.iter()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.keys()
    }

    fn name_taken(&self, display_name: &str) -> bool {
        self.members.values().any(|m| m.display_name == display_name)
    }

    /// Insert a member, enforcing per-room name uniqueness (case-sensitive
    /// exact match) and the capacity limit. On success the room is no longer
    /// considered emptied.
    pub fn insert_member(
        &mut self,
        id: ConnectionId,
        display_name: &str,
        joined_at: i64,
    ) -> Result<(), JoinError> {
        if self.name_taken(display_name) {
            return Err(JoinError::NameTaken);
        }
        if self.members.len() >= self.capacity {
            return Err(JoinError::RoomFull);
        }
        self.members.insert(
            id,
            Member {
                display_name: display_name.to_string(),
                audio_state: AudioState::Silent,
                joined_at,
            },
        );
        self.emptied_at = None;
        Ok(())
    }

    /// Remove a member, returning its record if it was present.
    pub fn remove_member(&mut self, id: &ConnectionId) -> Option<Member> {
        self.members.remove(id)
    }
}
