//! settingstore CLI
//!
//! Reads and changes a settings document held by a `settingstore-server`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use settingstore::{GatewayConfig, Store, StoreConfig, StoreError, TcpGateway};
use tracing_subscriber::{fmt, EnvFilter};

/// settingstore CLI
#[derive(Parser, Debug)]
#[command(name = "settingstore-cli")]
#[command(about = "CLI for settingstore documents")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9200")]
    server: String,

    /// Namespace holding the document
    #[arg(short, long, default_value = "settings")]
    namespace: String,

    /// Directory for the local cache record
    #[arg(long, default_value = settingstore::config::DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Default document (JSON object) used if none exists remotely
    #[arg(short, long, default_value = r#"{"level":"info"}"#)]
    default: String,

    /// Remote call timeout in milliseconds
    #[arg(long, default_value = "3000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current document
    Get,

    /// Replace the document
    Set {
        /// The new document (JSON object)
        document: String,
    },

    /// Recreate the document from the default
    Reset,

    /// Fetch the document again and print it
    Refresh,

    /// Ping the server
    Ping,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> settingstore::Result<()> {
    let gateway = Arc::new(TcpGateway::new(GatewayConfig {
        addr: args.server.clone(),
        connect_timeout_ms: args.timeout_ms,
        read_timeout_ms: args.timeout_ms,
        write_timeout_ms: args.timeout_ms,
    }));

    if let Commands::Ping = args.command {
        use settingstore::DocumentGateway;
        gateway.ping()?;
        println!("PONG");
        return Ok(());
    }

    let config = StoreConfig::builder()
        .namespace(&args.namespace)
        .default_document(parse_json(&args.default)?)
        .cache_dir(&args.cache_dir)
        .build();

    let store = Store::open(config, gateway)?;

    match args.command {
        Commands::Set { document } => store.write(&parse_json(&document)?)?,
        Commands::Reset => store.reset()?,
        Commands::Refresh => store.refresh()?,
        Commands::Get | Commands::Ping => {}
    }

    let current: Value = store.read()?;
    let pretty = serde_json::to_string_pretty(&current)
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    println!("{}", pretty);

    store.close();
    Ok(())
}

fn parse_json(text: &str) -> settingstore::Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| StoreError::InvalidArgument(format!("invalid JSON {:?}: {}", text, e)))
}
