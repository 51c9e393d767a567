//! Room coordination: the server-side state machine behind the relay.
//!
//! The coordinator owns the registry of rooms and the connection → room
//! lookup. Every inbound event goes through one typed entry point and comes
//! back out as a [`Dispatch`]: an explicit delivery plan the gateway executes
//! after the coordinator lock is released. The coordinator itself never
//! performs I/O, which keeps every state transition unit-testable without a
//! socket.

use std::collections::HashMap;

use crate::common::time::Clock;
use crate::config::Config;
use crate::domain::{AudioState, ConnectionId, JoinError, RelayError, Room};
use crate::protocol::{ClientMessage, RosterEntry, ServerMessage, SignalKind};

/// One planned send: a serialized-later message addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: ConnectionId,
    pub message: ServerMessage,
}

/// The outcome of one coordinator operation: the sends to perform, plus a
/// note for the grace reaper when a room just became empty under a configured
/// retention window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub deliveries: Vec<Delivery>,
    pub emptied_room: Option<String>,
}

impl Dispatch {
    fn none() -> Self {
        Self::default()
    }

    fn reply(target: ConnectionId, message: ServerMessage) -> Self {
        Self {
            deliveries: vec![Delivery { target, message }],
            emptied_room: None,
        }
    }
}

/// Tracks which users are in which room and computes delivery plans for
/// join/leave/relay/presence/chat events.
pub struct Coordinator {
    config: Config,
    clock: Box<dyn Clock>,
    rooms: HashMap<String, Room>,
    /// Connection → room key, for connections currently joined somewhere.
    memberships: HashMap<ConnectionId, String>,
}

impl Coordinator {
    pub fn new(config: Config, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            rooms: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    /// Single entry point for every decoded client message.
    pub fn handle_message(&mut self, conn: ConnectionId, message: ClientMessage) -> Dispatch {
        match message {
            ClientMessage::JoinRoom {
                room_key,
                display_name,
            } => self.join(conn, &room_key, &display_name),
            ClientMessage::Offer {
                target_member_id,
                payload,
            } => self.relay(conn, SignalKind::Offer, target_member_id, payload),
            ClientMessage::Answer {
                target_member_id,
                payload,
            } => self.relay(conn, SignalKind::Answer, target_member_id, payload),
            ClientMessage::IceCandidate {
                target_member_id,
                payload,
            } => self.relay(conn, SignalKind::IceCandidate, target_member_id, payload),
            ClientMessage::AudioStart => self.presence_change(conn, true),
            ClientMessage::AudioEnd => self.presence_change(conn, false),
            ClientMessage::ChatMessage { text } => self.chat(conn, &text),
            ClientMessage::LeaveRoom => self.leave(conn),
        }
    }

    /// Transport-level disconnect. Same semantics as an explicit leave.
    pub fn handle_disconnect(&mut self, conn: ConnectionId) -> Dispatch {
        self.leave(conn)
    }

    fn join(&mut self, conn: ConnectionId, room_key: &str, display_name: &str) -> Dispatch {
        let room_key = room_key.trim();
        let display_name = display_name.trim();
        if room_key.is_empty() || display_name.is_empty() {
            tracing::debug!(%conn, "join rejected: empty room key or display name");
            return Dispatch::reply(
                conn,
                ServerMessage::InvalidInput {
                    reason: "room key and display name must be non-empty".to_string(),
                },
            );
        }

        // Validate before any mutation, so a rejected join neither creates a
        // room nor kicks the sender out of its current one. The checks treat
        // the sender as if it had already left, since an accepted join of an
        // already-joined connection is a leave-then-join.
        if let Some(room) = self.rooms.get(room_key) {
            let already_member = room.contains(&conn);
            let check = if room
                .members()
                .any(|(id, m)| *id != conn && m.display_name == display_name)
            {
                Some(JoinError::NameTaken)
            } else if room.member_count() - usize::from(already_member)
                >= self.config.room_capacity
            {
                Some(JoinError::RoomFull)
            } else {
                None
            };
            if let Some(err) = check {
                tracing::debug!(%conn, room_key, %err, "join rejected");
                return Dispatch::reply(conn, join_rejection(room_key, err));
            }
        } else if self.config.room_capacity == 0 {
            return Dispatch::reply(conn, join_rejection(room_key, JoinError::RoomFull));
        }

        // No silent double membership.
        let mut dispatch = if self.memberships.contains_key(&conn) {
            self.leave(conn)
        } else {
            Dispatch::none()
        };

        let now = self.clock.now_millis();
        let capacity = self.config.room_capacity;
        let room = self
            .rooms
            .entry(room_key.to_string())
            .or_insert_with(|| Room::new(now, capacity));
        if let Err(err) = room.insert_member(conn, display_name, now) {
            // Unreachable after the checks above, but never panic on it.
            tracing::warn!(%conn, room_key, %err, "join rejected at insert");
            dispatch.deliveries.push(Delivery {
                target: conn,
                message: join_rejection(room_key, err),
            });
            return dispatch;
        }
        self.memberships.insert(conn, room_key.to_string());
        tracing::info!(%conn, room_key, display_name, "member joined");

        // Roster to the new member first, then the member-joined broadcast,
        // so the new member never observes its own join before its roster.
        let room = &self.rooms[room_key];
        dispatch.deliveries.push(Delivery {
            target: conn,
            message: ServerMessage::Joined {
                room_key: room_key.to_string(),
                member_id: conn,
                roster: roster(room, Some(&conn)),
            },
        });
        let joined = ServerMessage::MemberJoined {
            member_id: conn,
            display_name: display_name.to_string(),
            roster: roster(room, None),
        };
        for target in broadcast_targets(room, Some(&conn)) {
            dispatch.deliveries.push(Delivery {
                target,
                message: joined.clone(),
            });
        }
        dispatch
    }

    fn relay(
        &mut self,
        conn: ConnectionId,
        kind: SignalKind,
        target: ConnectionId,
        payload: serde_json::Value,
    ) -> Dispatch {
        match self.authorize_relay(&conn, &target) {
            Ok(()) => Dispatch::reply(target, kind.deliver(conn, payload)),
            Err(err) => {
                // Stale targets are ordinary churn; cross-room targets are
                // worth a louder note.
                match err {
                    RelayError::UnauthorizedTarget => {
                        tracing::warn!(%conn, %target, kind = kind.as_str(), "dropped cross-room relay")
                    }
                    _ => {
                        tracing::debug!(%conn, %target, kind = kind.as_str(), %err, "dropped relay")
                    }
                }
                Dispatch::none()
            }
        }
    }

    /// Relay authorization: the sender must be joined and the target must be
    /// a current member of the sender's own room.
    fn authorize_relay(
        &self,
        conn: &ConnectionId,
        target: &ConnectionId,
    ) -> Result<(), RelayError> {
        let room_key = self.memberships.get(conn).ok_or(RelayError::NotJoined)?;
        if self.rooms[room_key].contains(target) {
            Ok(())
        } else if self.memberships.contains_key(target) {
            Err(RelayError::UnauthorizedTarget)
        } else {
            Err(RelayError::StaleTarget)
        }
    }

    fn presence_change(&mut self, conn: ConnectionId, talking: bool) -> Dispatch {
        let Some(room_key) = self.memberships.get(&conn).cloned() else {
            tracing::debug!(%conn, "dropped presence change from unjoined connection");
            return Dispatch::none();
        };
        let room = self
            .rooms
            .get_mut(&room_key)
            .expect("membership points at a live room");
        if let Some(member) = room.member_mut(&conn) {
            member.audio_state = if talking {
                AudioState::Talking
            } else {
                AudioState::Silent
            };
        }
        // Repeated identical reports still broadcast; consumers tolerate
        // redundant updates.
        let message = if talking {
            ServerMessage::AudioStart { member_id: conn }
        } else {
            ServerMessage::AudioEnd { member_id: conn }
        };
        let deliveries = broadcast_targets(room, Some(&conn))
            .into_iter()
            .map(|target| Delivery {
                target,
                message: message.clone(),
            })
            .collect();
        Dispatch {
            deliveries,
            emptied_room: None,
        }
    }

    fn chat(&mut self, conn: ConnectionId, text: &str) -> Dispatch {
        let Some(room_key) = self.memberships.get(&conn) else {
            tracing::debug!(%conn, "dropped chat from unjoined connection");
            return Dispatch::none();
        };
        let text = text.trim();
        if text.is_empty() {
            return Dispatch::none();
        }
        let room = &self.rooms[room_key];
        let sender_name = room
            .member(&conn)
            .map(|m| m.display_name.clone())
            .unwrap_or_default();
        // The sender is included so every client renders chat through the
        // same delivery path. The timestamp is server-assigned.
        let message = ServerMessage::ChatMessage {
            sender_id: conn,
            sender_name,
            text: text.to_string(),
            timestamp: self.clock.now_millis(),
        };
        let deliveries = broadcast_targets(room, None)
            .into_iter()
            .map(|target| Delivery {
                target,
                message: message.clone(),
            })
            .collect();
        Dispatch {
            deliveries,
            emptied_room: None,
        }
    }

    /// Explicit leave or transport disconnect. Safe to call twice for the
    /// same connection; the second call is a no-op.
    fn leave(&mut self, conn: ConnectionId) -> Dispatch {
        let Some(room_key) = self.memberships.remove(&conn) else {
            return Dispatch::none();
        };
        let room = self
            .rooms
            .get_mut(&room_key)
            .expect("membership points at a live room");
        let Some(member) = room.remove_member(&conn) else {
            return Dispatch::none();
        };
        tracing::info!(%conn, room_key, display_name = %member.display_name, "member left");

        let mut dispatch = Dispatch::none();
        if room.is_empty() {
            if let Some(grace) = self.config.empty_room_grace {
                room.emptied_at = Some(self.clock.now_millis());
                dispatch.emptied_room = Some(room_key.clone());
                tracing::debug!(room_key, grace_secs = grace.as_secs(), "room emptied, retained");
            } else {
                self.rooms.remove(&room_key);
                tracing::info!(room_key, "room removed");
            }
            return dispatch;
        }

        let left = ServerMessage::MemberLeft {
            member_id: conn,
            display_name: member.display_name,
            roster: roster(room, None),
        };
        for target in broadcast_targets(room, None) {
            dispatch.deliveries.push(Delivery {
                target,
                message: left.clone(),
            });
        }
        dispatch
    }

    /// Remove a room that has stayed empty through its grace window. Returns
    /// whether the room was actually removed.
    pub fn reap_if_empty(&mut self, room_key: &str) -> bool {
        match self.rooms.get(room_key) {
            Some(room) if room.is_empty() => {
                self.rooms.remove(room_key);
                tracing::info!(room_key, "room removed after grace window");
                true
            }
            _ => false,
        }
    }

    /// Read-only view for the stats endpoint: (room key, member count),
    /// sorted by key.
    pub fn room_stats(&self) -> Vec<(String, usize)> {
        let mut stats: Vec<(String, usize)> = self
            .rooms
            .iter()
            .map(|(key, room)| (key.clone(), room.member_count()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    #[cfg(test)]
    fn room(&self, key: &str) -> Option<&Room> {
        self.rooms.get(key)
    }
}

fn join_rejection(room_key: &str, err: JoinError) -> ServerMessage {
    match err {
        JoinError::NameTaken => ServerMessage::NameTaken {
            room_key: room_key.to_string(),
        },
        JoinError::RoomFull => ServerMessage::RoomFull {
            room_key: room_key.to_string(),
        },
        JoinError::InvalidInput(reason) => ServerMessage::InvalidInput { reason },
    }
}

/// Snapshot of a room's membership, sorted by member id for deterministic
/// output, optionally excluding one member.
fn roster(room: &Room, exclude: Option<&ConnectionId>) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = room
        .members()
        .filter(|&(id, _)| Some(id) != exclude)
        .map(|(id, member)| RosterEntry {
            member_id: *id,
            display_name: member.display_name.clone(),
            talking: member.audio_state == AudioState::Talking,
        })
        .collect();
    entries.sort_by_key(|e| e.member_id.to_string());
    entries
}

/// Connections a room-wide broadcast goes to, optionally excluding one.
fn broadcast_targets(room: &Room, exclude: Option<&ConnectionId>) -> Vec<ConnectionId> {
    let mut targets: Vec<ConnectionId> = room
        .member_ids()
        .filter(|&id| Some(id) != exclude)
        .copied()
        .collect();
    targets.sort_by_key(|id| id.to_string());
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time::FixedClock;
    use serde_json::json;

    fn coordinator() -> Coordinator {
        Coordinator::new(Config::default(), Box::new(FixedClock::new(1_000)))
    }

    fn coordinator_with(config: Config) -> Coordinator {
        Coordinator::new(config, Box::new(FixedClock::new(1_000)))
    }

    fn join(c: &mut Coordinator, conn: ConnectionId, room: &str, name: &str) -> Dispatch {
        c.handle_message(
            conn,
            ClientMessage::JoinRoom {
                room_key: room.to_string(),
                display_name: name.to_string(),
            },
        )
    }

    fn messages_for(dispatch: &Dispatch, target: ConnectionId) -> Vec<&ServerMessage> {
        dispatch
            .deliveries
            .iter()
            .filter(|d| d.target == target)
            .map(|d| &d.message)
            .collect()
    }

    #[test]
    fn test_first_join_creates_room_and_returns_empty_roster() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();

        // when:
        let dispatch = join(&mut c, alice, "42", "alice");

        // then:
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(
            dispatch.deliveries[0].message,
            ServerMessage::Joined {
                room_key: "42".to_string(),
                member_id: alice,
                roster: vec![],
            }
        );
        assert_eq!(c.room("42").unwrap().member_count(), 1);
    }

    #[test]
    fn test_second_join_sends_roster_before_member_joined_broadcast() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");

        // when:
        let dispatch = join(&mut c, bob, "42", "bob");

        // then: bob's own roster is planned before alice's broadcast
        assert_eq!(dispatch.deliveries.len(), 2);
        assert_eq!(dispatch.deliveries[0].target, bob);
        match &dispatch.deliveries[0].message {
            ServerMessage::Joined { roster, .. } => {
                assert_eq!(roster.len(), 1);
                assert_eq!(roster[0].display_name, "alice");
            }
            other => panic!("expected Joined, got {other:?}"),
        }
        assert_eq!(dispatch.deliveries[1].target, alice);
        match &dispatch.deliveries[1].message {
            ServerMessage::MemberJoined {
                member_id,
                display_name,
                roster,
            } => {
                assert_eq!(*member_id, bob);
                assert_eq!(display_name, "bob");
                assert_eq!(roster.len(), 2);
            }
            other => panic!("expected MemberJoined, got {other:?}"),
        }
    }

    #[test]
    fn test_join_with_taken_name_is_rejected_without_mutation() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let impostor = ConnectionId::new();
        join(&mut c, alice, "42", "alice");

        // when:
        let dispatch = join(&mut c, impostor, "42", "alice");

        // then: only the requester hears about it
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(dispatch.deliveries[0].target, impostor);
        assert_eq!(
            dispatch.deliveries[0].message,
            ServerMessage::NameTaken {
                room_key: "42".to_string()
            }
        );
        assert_eq!(c.room("42").unwrap().member_count(), 1);
    }

    #[test]
    fn test_join_full_room_is_rejected() {
        // given:
        let mut c = coordinator_with(Config {
            room_capacity: 2,
            ..Config::default()
        });
        join(&mut c, ConnectionId::new(), "42", "a");
        join(&mut c, ConnectionId::new(), "42", "b");
        let late = ConnectionId::new();

        // when:
        let dispatch = join(&mut c, late, "42", "c");

        // then:
        assert_eq!(
            dispatch.deliveries[0].message,
            ServerMessage::RoomFull {
                room_key: "42".to_string()
            }
        );
        assert_eq!(c.room("42").unwrap().member_count(), 2);
    }

    #[test]
    fn test_join_with_blank_fields_is_invalid_input() {
        // given:
        let mut c = coordinator();
        let conn = ConnectionId::new();

        // when:
        let dispatch = join(&mut c, conn, "  ", "alice");

        // then:
        assert!(matches!(
            dispatch.deliveries[0].message,
            ServerMessage::InvalidInput { .. }
        ));
        assert!(c.room_stats().is_empty());
    }

    #[test]
    fn test_join_trims_room_key_and_display_name() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();

        // when:
        join(&mut c, alice, " 42 ", "  alice  ");

        // then:
        let room = c.room("42").unwrap();
        assert_eq!(room.member(&alice).unwrap().display_name, "alice");
    }

    #[test]
    fn test_rejoining_another_room_leaves_the_first() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");

        // when: bob hops to another room
        let dispatch = join(&mut c, bob, "99", "bob");

        // then: alice is told bob left "42", bob gets a fresh roster for "99"
        let to_alice = messages_for(&dispatch, alice);
        assert!(matches!(to_alice[0], ServerMessage::MemberLeft { member_id, .. } if *member_id == bob));
        assert_eq!(c.room("42").unwrap().member_count(), 1);
        assert_eq!(c.room("99").unwrap().member_count(), 1);
    }

    #[test]
    fn test_rejected_room_hop_keeps_current_membership() {
        // given: bob is in "42", "99" already has a bob
        let mut c = coordinator();
        let bob = ConnectionId::new();
        let other_bob = ConnectionId::new();
        join(&mut c, bob, "42", "bob");
        join(&mut c, other_bob, "99", "bob");

        // when: bob tries to hop into "99"
        let dispatch = join(&mut c, bob, "99", "bob");

        // then: rejected without leaving "42"
        assert_eq!(
            dispatch.deliveries[0].message,
            ServerMessage::NameTaken {
                room_key: "99".to_string()
            }
        );
        assert_eq!(c.room("42").unwrap().member_count(), 1);
        assert_eq!(c.room("99").unwrap().member_count(), 1);
    }

    #[test]
    fn test_rejoining_same_room_under_same_name_succeeds() {
        // The sender's own entry does not count as a name clash; the rejoin
        // is a leave-then-join.
        let mut c = coordinator();
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");

        let dispatch = join(&mut c, alice, "42", "alice");

        assert!(matches!(
            &dispatch.deliveries.last().unwrap().message,
            ServerMessage::Joined { roster, .. } if roster.is_empty()
        ));
        assert_eq!(c.room("42").unwrap().member_count(), 1);
    }

    #[test]
    fn test_relay_delivers_payload_tagged_with_true_sender() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");

        // when:
        let dispatch = c.handle_message(
            bob,
            ClientMessage::Offer {
                target_member_id: alice,
                payload: json!({"sdp": "v=0..."}),
            },
        );

        // then:
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(dispatch.deliveries[0].target, alice);
        assert_eq!(
            dispatch.deliveries[0].message,
            ServerMessage::Offer {
                sender_member_id: bob,
                payload: json!({"sdp": "v=0..."}),
            }
        );
    }

    #[test]
    fn test_cross_room_relay_is_dropped() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let eve = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, eve, "99", "eve");

        // when:
        let dispatch = c.handle_message(
            eve,
            ClientMessage::Offer {
                target_member_id: alice,
                payload: json!({}),
            },
        );

        // then:
        assert!(dispatch.deliveries.is_empty());
    }

    #[test]
    fn test_relay_to_departed_target_is_dropped_silently() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");
        c.handle_disconnect(alice);

        // when:
        let dispatch = c.handle_message(
            bob,
            ClientMessage::IceCandidate {
                target_member_id: alice,
                payload: json!({"candidate": "..."}),
            },
        );

        // then:
        assert!(dispatch.deliveries.is_empty());
    }

    #[test]
    fn test_messages_from_unjoined_connections_are_dropped() {
        // given:
        let mut c = coordinator();
        let stranger = ConnectionId::new();

        // when / then: relay, chat, and presence all drop without effect
        for message in [
            ClientMessage::Offer {
                target_member_id: ConnectionId::new(),
                payload: json!({}),
            },
            ClientMessage::ChatMessage {
                text: "hi".to_string(),
            },
            ClientMessage::AudioStart,
        ] {
            let dispatch = c.handle_message(stranger, message);
            assert!(dispatch.deliveries.is_empty());
        }
    }

    #[test]
    fn test_presence_change_broadcasts_to_others_only() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");

        // when:
        let dispatch = c.handle_message(alice, ClientMessage::AudioStart);

        // then:
        assert_eq!(dispatch.deliveries.len(), 1);
        assert_eq!(dispatch.deliveries[0].target, bob);
        assert_eq!(
            dispatch.deliveries[0].message,
            ServerMessage::AudioStart { member_id: alice }
        );
        assert_eq!(
            c.room("42").unwrap().member(&alice).unwrap().audio_state,
            AudioState::Talking
        );
    }

    #[test]
    fn test_repeated_presence_reports_still_broadcast() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");
        c.handle_message(alice, ClientMessage::AudioStart);

        // when: the same state is reported again
        let dispatch = c.handle_message(alice, ClientMessage::AudioStart);

        // then:
        assert_eq!(dispatch.deliveries.len(), 1);
    }

    #[test]
    fn test_presence_shows_up_in_later_rosters() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        c.handle_message(alice, ClientMessage::AudioStart);

        // when: someone joins while alice is talking
        let bob = ConnectionId::new();
        let dispatch = join(&mut c, bob, "42", "bob");

        // then:
        match &dispatch.deliveries[0].message {
            ServerMessage::Joined { roster, .. } => {
                assert!(roster.iter().any(|e| e.member_id == alice && e.talking));
            }
            other => panic!("expected Joined, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_broadcasts_to_whole_room_with_server_timestamp() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");

        // when:
        let dispatch = c.handle_message(
            alice,
            ClientMessage::ChatMessage {
                text: "  hello  ".to_string(),
            },
        );

        // then: both members receive it, sender included
        assert_eq!(dispatch.deliveries.len(), 2);
        let expected = ServerMessage::ChatMessage {
            sender_id: alice,
            sender_name: "alice".to_string(),
            text: "hello".to_string(),
            timestamp: 1_000,
        };
        assert!(dispatch.deliveries.iter().all(|d| d.message == expected));
        let targets: Vec<ConnectionId> = dispatch.deliveries.iter().map(|d| d.target).collect();
        assert!(targets.contains(&alice));
        assert!(targets.contains(&bob));
    }

    #[test]
    fn test_blank_chat_is_dropped() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");

        // when:
        let dispatch = c.handle_message(
            alice,
            ClientMessage::ChatMessage {
                text: "   ".to_string(),
            },
        );

        // then:
        assert!(dispatch.deliveries.is_empty());
    }

    #[test]
    fn test_leave_broadcasts_member_left_and_is_idempotent() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        join(&mut c, bob, "42", "bob");

        // when: explicit leave races a transport disconnect
        let first = c.handle_message(bob, ClientMessage::LeaveRoom);
        let second = c.handle_disconnect(bob);

        // then: member-left goes out at most once
        assert_eq!(first.deliveries.len(), 1);
        assert_eq!(first.deliveries[0].target, alice);
        match &first.deliveries[0].message {
            ServerMessage::MemberLeft {
                member_id, roster, ..
            } => {
                assert_eq!(*member_id, bob);
                assert_eq!(roster.len(), 1);
            }
            other => panic!("expected MemberLeft, got {other:?}"),
        }
        assert!(second.deliveries.is_empty());
    }

    #[test]
    fn test_last_leave_removes_room_immediately_without_grace() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");

        // when:
        let dispatch = c.handle_disconnect(alice);

        // then:
        assert!(dispatch.deliveries.is_empty());
        assert_eq!(dispatch.emptied_room, None);
        assert!(c.room("42").is_none());
    }

    #[test]
    fn test_grace_window_defers_room_removal() {
        // given:
        let mut c = coordinator_with(Config {
            room_capacity: 10,
            empty_room_grace: Some(std::time::Duration::from_secs(300)),
        });
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");

        // when:
        let dispatch = c.handle_disconnect(alice);

        // then: the room is retained and flagged for the reaper
        assert_eq!(dispatch.emptied_room, Some("42".to_string()));
        assert!(c.room("42").is_some());
        assert!(c.reap_if_empty("42"));
        assert!(c.room("42").is_none());
    }

    #[test]
    fn test_rejoin_during_grace_window_keeps_the_room() {
        // given:
        let mut c = coordinator_with(Config {
            room_capacity: 10,
            empty_room_grace: Some(std::time::Duration::from_secs(300)),
        });
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        c.handle_disconnect(alice);

        // when: someone joins before the reaper fires
        let bob = ConnectionId::new();
        join(&mut c, bob, "42", "bob");

        // then: the reaper finds the room occupied and leaves it alone
        assert!(!c.reap_if_empty("42"));
        assert_eq!(c.room("42").unwrap().member_count(), 1);
    }

    #[test]
    fn test_fresh_room_after_reclamation_has_no_residual_members() {
        // given:
        let mut c = coordinator();
        let alice = ConnectionId::new();
        join(&mut c, alice, "42", "alice");
        c.handle_disconnect(alice);

        // when:
        let bob = ConnectionId::new();
        let dispatch = join(&mut c, bob, "42", "alice");

        // then: the old "alice" name is free again
        match &dispatch.deliveries[0].message {
            ServerMessage::Joined { roster, .. } => assert!(roster.is_empty()),
            other => panic!("expected Joined, got {other:?}"),
        }
    }

    #[test]
    fn test_room_stats_reports_keys_and_member_counts() {
        // given:
        let mut c = coordinator();
        join(&mut c, ConnectionId::new(), "42", "alice");
        join(&mut c, ConnectionId::new(), "42", "bob");
        join(&mut c, ConnectionId::new(), "99", "carol");

        // when:
        let stats = c.room_stats();

        // then:
        assert_eq!(
            stats,
            vec![("42".to_string(), 2), ("99".to_string(), 1)]
        );
    }

    #[test]
    fn test_full_session_scenario() {
        // The end-to-end room lifecycle: joins, rejection, relay, churn,
        // reclamation.
        let mut c = coordinator();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let impostor = ConnectionId::new();

        // alice joins an empty room
        let d = join(&mut c, alice, "42", "alice");
        assert!(matches!(
            &d.deliveries[0].message,
            ServerMessage::Joined { roster, .. } if roster.is_empty()
        ));

        // bob joins; alice is notified
        let d = join(&mut c, bob, "42", "bob");
        assert!(!messages_for(&d, alice).is_empty());

        // a second "alice" is turned away
        let d = join(&mut c, impostor, "42", "alice");
        assert_eq!(
            d.deliveries[0].message,
            ServerMessage::NameTaken {
                room_key: "42".to_string()
            }
        );

        // bob sends alice an offer
        let d = c.handle_message(
            bob,
            ClientMessage::Offer {
                target_member_id: alice,
                payload: json!({"sdp": "x"}),
            },
        );
        assert_eq!(d.deliveries[0].target, alice);

        // bob drops; alice hears member-left
        let d = c.handle_disconnect(bob);
        assert!(matches!(
            &d.deliveries[0].message,
            ServerMessage::MemberLeft { member_id, .. } if *member_id == bob
        ));
        assert_eq!(c.room("42").unwrap().member_count(), 1);

        // alice drops; the room is reclaimed
        c.handle_disconnect(alice);
        assert!(c.room("42").is_none());
    }
}
