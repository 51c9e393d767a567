//! Connection gateway: the outbound half of the message bus.
//!
//! Each accepted WebSocket gets an unbounded channel; a writer task drains it
//! into the socket. The gateway maps connection ids to those channels and
//! executes the delivery plans the coordinator computes. Sends are
//! best-effort: a target that disconnected between plan and delivery is
//! logged and skipped, never an error for the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::coordinator::Dispatch;
use crate::domain::ConnectionId;
use crate::protocol::ServerMessage;

/// Outbound delivery seam between the coordinator dispatch path and the
/// transport. Mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Register a newly accepted connection's outbound channel.
    async fn register(&self, conn: ConnectionId, sender: mpsc::UnboundedSender<String>);

    /// Drop a closed connection's channel.
    async fn unregister(&self, conn: &ConnectionId);

    /// Best-effort send of one message to one connection.
    async fn send(&self, conn: &ConnectionId, message: &ServerMessage);

    /// Execute a delivery plan in order.
    async fn deliver(&self, dispatch: &Dispatch);
}

/// Production [`MessageSink`] over per-connection unbounded channels.
pub struct Gateway {
    connections: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSink for Gateway {
    async fn register(&self, conn: ConnectionId, sender: mpsc::UnboundedSender<String>) {
        let mut connections = self.connections.lock().await;
        connections.insert(conn, sender);
        tracing::debug!(%conn, "connection registered");
    }

    async fn unregister(&self, conn: &ConnectionId) {
        let mut connections = self.connections.lock().await;
        connections.remove(conn);
        tracing::debug!(%conn, "connection unregistered");
    }

    async fn send(&self, conn: &ConnectionId, message: &ServerMessage) {
        let serialized = match serde_json::to_string(message) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(%conn, "failed to serialize outbound message: {e}");
                return;
            }
        };
        let connections = self.connections.lock().await;
        match connections.get(conn) {
            Some(sender) => {
                if sender.send(serialized).is_err() {
                    tracing::debug!(%conn, "send to closing connection dropped");
                }
            }
            None => {
                tracing::debug!(%conn, "send to unknown connection dropped");
            }
        }
    }

    async fn deliver(&self, dispatch: &Dispatch) {
        for delivery in &dispatch.deliveries {
            self.send(&delivery.target, &delivery.message).await;
        }
    }
}
