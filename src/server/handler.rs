//! WebSocket and HTTP handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::ConnectionId;
use crate::protocol::ClientMessage;

use super::state::{AppState, dispatch_client_message, dispatch_disconnect};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();

    // Outbound channel for this connection; a writer task drains it into the
    // socket so delivery never blocks the coordinator.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.sink.register(conn, tx).await;
    tracing::info!(%conn, "connection accepted");

    let mut write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    let read_state = state.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(%conn, "websocket error: {e}");
                    break;
                }
            };
            match message {
                Message::Text(text) => {
                    // Unknown or malformed kinds are dropped with a log;
                    // they never crash the connection.
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_message) => {
                            dispatch_client_message(read_state.clone(), conn, client_message)
                                .await;
                        }
                        Err(e) => {
                            tracing::warn!(%conn, "dropped undecodable message: {e}");
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::debug!(%conn, "close frame received");
                    break;
                }
                // Ping/pong is answered by axum itself.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    // Exactly one disconnect per connection, after both halves are done.
    state.sink.unregister(&conn).await;
    dispatch_disconnect(state, conn).await;
    tracing::info!(%conn, "connection closed");
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub room_key: String,
    pub member_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub room_count: usize,
    pub rooms: Vec<RoomStats>,
}

/// Read-only registry view for operational monitoring.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.coordinator.lock().await.room_stats();
    let rooms: Vec<RoomStats> = stats
        .into_iter()
        .map(|(room_key, member_count)| RoomStats {
            room_key,
            member_count,
        })
        .collect();
    Json(StatsResponse {
        room_count: rooms.len(),
        rooms,
    })
}
