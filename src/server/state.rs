//! Shared application state and the dispatch path.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::common::time::SystemClock;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::domain::ConnectionId;
use crate::gateway::{Gateway, MessageSink};
use crate::protocol::ClientMessage;

/// Shared application state: the coordinator behind one mutex, the outbound
/// sink, and the policy config.
pub struct AppState {
    pub config: Config,
    pub coordinator: Mutex<Coordinator>,
    pub sink: Arc<dyn MessageSink>,
}

impl AppState {
    pub fn new(config: Config, coordinator: Coordinator, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            config,
            coordinator: Mutex::new(coordinator),
            sink,
        }
    }

    /// Production wiring: system clock and the channel-backed gateway.
    pub fn with_defaults(config: Config) -> Self {
        let coordinator = Coordinator::new(config, Box::new(SystemClock));
        Self::new(config, coordinator, Arc::new(Gateway::new()))
    }
}

/// Run one decoded client message through the coordinator and execute the
/// resulting delivery plan.
///
/// The plan is computed under the coordinator lock and delivered after it is
/// released, so a slow receiver never stalls other rooms.
pub async fn dispatch_client_message(
    state: Arc<AppState>,
    conn: ConnectionId,
    message: ClientMessage,
) {
    let dispatch = {
        let mut coordinator = state.coordinator.lock().await;
        coordinator.handle_message(conn, message)
    };
    state.sink.deliver(&dispatch).await;
    if let Some(room_key) = dispatch.emptied_room {
        schedule_reap(state, room_key);
    }
}

/// Transport-level disconnect: same leave semantics as an explicit
/// `leave-room`, guaranteed to run to completion.
pub async fn dispatch_disconnect(state: Arc<AppState>, conn: ConnectionId) {
    let dispatch = {
        let mut coordinator = state.coordinator.lock().await;
        coordinator.handle_disconnect(conn)
    };
    state.sink.deliver(&dispatch).await;
    if let Some(room_key) = dispatch.emptied_room {
        schedule_reap(state, room_key);
    }
}

/// Arm the grace-window reaper for a room that just became empty. The reaper
/// re-checks emptiness, so a re-join during the window keeps the room.
fn schedule_reap(state: Arc<AppState>, room_key: String) {
    let Some(grace) = state.config.empty_room_grace else {
        return;
    };
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let removed = state.coordinator.lock().await.reap_if_empty(&room_key);
        if !removed {
            tracing::debug!(room_key, "grace window elapsed, room re-occupied");
        }
    });
}
