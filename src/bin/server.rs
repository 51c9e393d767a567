//! Room-based voice/chat signaling server binary.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin roomcast-server
//! cargo run --bin roomcast-server -- --host 0.0.0.0 --port 3000 --room-capacity 8
//! ```

use std::time::Duration;

use clap::Parser;
use roomcast::{common::logger::setup_logger, config::Config, server::run_server};

#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "WebRTC voice room signaling server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Maximum number of members per room
    #[arg(long, default_value_t = 10)]
    room_capacity: usize,

    /// Keep emptied rooms around for this many seconds before deleting them.
    /// Omit for immediate deletion.
    #[arg(long)]
    empty_room_grace_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = Config {
        room_capacity: args.room_capacity,
        empty_room_grace: args.empty_room_grace_secs.map(Duration::from_secs),
    };

    if let Err(e) = run_server(args.host, args.port, config).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
