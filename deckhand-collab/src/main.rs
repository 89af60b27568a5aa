//! Deckhand session server binary.
//!
//! Serves the real-time WebSocket channel and the REST API, optionally
//! persisting decks in RocksDB and serving a front-end bundle.

use std::path::PathBuf;

use clap::Parser;
use deckhand_collab::{CollabServer, ServerConfig};
use log::info;

/// Server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "deckhand-server")]
#[command(about = "Real-time collaborative slide-deck session server")]
struct Args {
    /// WebSocket listen address
    #[arg(long, env = "DECKHAND_BIND_ADDR", default_value = "127.0.0.1:9090")]
    bind: String,

    /// HTTP API listen address
    #[arg(long, env = "DECKHAND_HTTP_ADDR", default_value = "127.0.0.1:5000")]
    http: String,

    /// RocksDB directory; decks live in memory when omitted
    #[arg(short, long, env = "DECKHAND_STORAGE", value_name = "PATH")]
    storage: Option<PathBuf>,

    /// Front-end build directory served on the HTTP listener
    #[arg(long, env = "DECKHAND_STATIC_DIR", value_name = "PATH")]
    static_dir: Option<PathBuf>,

    /// Per-room broadcast buffer, in frames
    #[arg(long, env = "DECKHAND_BROADCAST_CAPACITY", default_value_t = 256)]
    broadcast_capacity: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            http_addr: self.http,
            broadcast_capacity: self.broadcast_capacity,
            storage_path: self.storage,
            static_dir: self.static_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    info!("Starting deckhand-server");
    let server = CollabServer::new(args.into_config())?;
    server.run().await
}
