//! ChunkDB Server Binary
//!
//! Starts the TCP daemon for ChunkDB.

use std::sync::Arc;

use chunkdb::network::Server;
use chunkdb::{Config, Coordinator, Engine};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// ChunkDB Server
#[derive(Parser, Debug)]
#[command(name = "chunkdb-server")]
#[command(about = "Lightweight document database daemon")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./chunkdb_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8008")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Maximum documents per chunk
    #[arg(short, long, default_value = "1000")]
    chunk_capacity: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chunkdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ChunkDB Server v{}", chunkdb::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .chunk_capacity(args.chunk_capacity)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let coordinator = Arc::new(Coordinator::new(engine));

    // Start server
    let server = Server::new(config, coordinator);
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
