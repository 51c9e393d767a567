//! Axum wiring: WebSocket endpoint, HTTP views, and server lifecycle.

mod handler;
mod runner;
mod signal;
mod state;

pub use runner::{build_app, run_server};
pub use state::AppState;
