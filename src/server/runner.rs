//! Server execution logic.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::config::Config;

use super::{
    handler::{get_stats, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Build the application router over the given state. Exposed separately so
/// tests can serve it on an ephemeral port.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the signaling server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
/// * `config` - Room coordination policy
pub async fn run_server(
    host: String,
    port: u16,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::with_defaults(config));
    let app = build_app(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "signaling server listening on {}",
        listener.local_addr()?
    );
    tracing::info!("connect to: ws://{}/ws", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");

    Ok(())
}
