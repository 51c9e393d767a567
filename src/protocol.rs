//! Wire protocol for the signaling channel.
//!
//! Messages are internally tagged JSON (`"type"` field, kebab-case kinds).
//! Signaling payloads (`offer` / `answer` / `ice-candidate`) are opaque to the
//! server: they are carried as [`serde_json::Value`] and forwarded without
//! inspection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ConnectionId;

/// One entry of a room's membership list, as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub member_id: ConnectionId,
    pub display_name: String,
    pub talking: bool,
}

/// The three WebRTC negotiation payload kinds the server relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    /// Wrap a relayed payload into the delivered server message, tagged with
    /// the true sender id.
    pub fn deliver(self, sender: ConnectionId, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer {
                sender_member_id: sender,
                payload,
            },
            SignalKind::Answer => ServerMessage::Answer {
                sender_member_id: sender,
                payload,
            },
            SignalKind::IceCandidate => ServerMessage::IceCandidate {
                sender_member_id: sender,
                payload,
            },
        }
    }
}

/// Messages a client may send to the server.
///
/// Unknown kinds fail deserialization; the gateway drops them with a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_key: String,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Offer {
        target_member_id: ConnectionId,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        target_member_id: ConnectionId,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        target_member_id: ConnectionId,
        payload: Value,
    },
    AudioStart,
    AudioEnd,
    ChatMessage {
        text: String,
    },
    LeaveRoom,
}

/// Messages the server delivers to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Join succeeded. Carries the member's own server-assigned id and the
    /// current roster, excluding the member itself.
    #[serde(rename_all = "camelCase")]
    Joined {
        room_key: String,
        member_id: ConnectionId,
        roster: Vec<RosterEntry>,
    },
    #[serde(rename_all = "camelCase")]
    RoomFull { room_key: String },
    #[serde(rename_all = "camelCase")]
    NameTaken { room_key: String },
    InvalidInput { reason: String },
    #[serde(rename_all = "camelCase")]
    MemberJoined {
        member_id: ConnectionId,
        display_name: String,
        roster: Vec<RosterEntry>,
    },
    #[serde(rename_all = "camelCase")]
    MemberLeft {
        member_id: ConnectionId,
        display_name: String,
        roster: Vec<RosterEntry>,
    },
    #[serde(rename_all = "camelCase")]
    Offer {
        sender_member_id: ConnectionId,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        sender_member_id: ConnectionId,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        sender_member_id: ConnectionId,
        payload: Value,
    },
    #[serde(rename_all = "camelCase")]
    AudioStart { member_id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    AudioEnd { member_id: ConnectionId },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        sender_id: ConnectionId,
        sender_name: String,
        text: String,
        timestamp: i64,
    },
}
