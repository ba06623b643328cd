//! respkv Server Binary
//!
//! Replays the AOF, then starts the TCP server. Ctrl+C or SIGTERM stops it
//! and closes the AOF.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use respkv::network::Server;
use respkv::{Config, Engine, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// respkv Server
#[derive(Parser, Debug)]
#[command(name = "respkv-server")]
#[command(about = "In-memory key-value store speaking the Redis protocol")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./respkv_data")]
    data_dir: String,

    /// AOF file name inside the data directory
    #[arg(long, default_value = "appendonly.aof")]
    aof_file: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// When to fsync the AOF: always, everysec or no
    #[arg(short, long, default_value = "everysec")]
    sync: String,

    /// Period of the background fsync for `--sync everysec`
    #[arg(long, default_value = "1000")]
    sync_interval_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,respkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("respkv Server v{}", respkv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = match SyncStrategy::from_name(&args.sync, args.sync_interval_ms) {
        Ok(strategy) => strategy,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .aof_filename(&args.aof_file)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .sync_strategy(sync_strategy)
        .build();

    // Open engine; replay finishes before any connection is accepted
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let mut server = Server::new(config, engine);

    // SIGINT and SIGTERM stop the accept loop; serve() then closes the AOF
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, stopping...");
        shutdown.store(true, Ordering::Release);
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    if server.serve().is_err() {
        std::process::exit(1);
    }
    tracing::info!("Server stopped");
}
