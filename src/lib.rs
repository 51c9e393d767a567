//! Room-based WebRTC voice/chat signaling server.
//!
//! Clients join named rooms over one WebSocket each, exchange opaque
//! offer/answer/ICE payloads through the server, and receive membership,
//! push-to-talk, and chat events over the same channel. The server never
//! inspects signaling payloads; it only decides who receives what.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod gateway;
pub mod protocol;
pub mod server;

// shared utilities
pub mod common;
