//! settingstore document server
//!
//! Serves an in-memory document store over TCP for `TcpGateway` clients.

use std::sync::Arc;

use clap::Parser;
use settingstore::network::Server;
use settingstore::{MemoryGateway, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// settingstore document server
#[derive(Parser, Debug)]
#[command(name = "settingstore-server")]
#[command(about = "In-memory document store for settingstore clients")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9200")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Idle read timeout per connection in milliseconds (0 = none)
    #[arg(long, default_value = "5000")]
    read_timeout_ms: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,settingstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("settingstore server v{}", settingstore::VERSION);

    let config = ServerConfig {
        listen_addr: args.listen,
        max_connections: args.max_connections,
        read_timeout_ms: args.read_timeout_ms,
        ..ServerConfig::default()
    };

    let mut server = Server::new(config, Arc::new(MemoryGateway::new()));
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
