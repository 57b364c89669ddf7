//! Wirebus RPC server.
//!
//! Serves the WebSocket RPC endpoint and the HTTP identity route on one
//! port. Identities are resolved against a static token file; entities
//! persist to SQLite unless `--in-memory` is given.
//!
//! Usage:
//!   wirebus-server --port 4010 --auth-file tokens.json

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wirebus_server::{build_router, build_state, TokenFileResolver};
use wirebus_store::{EntityStore, MemoryStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "wirebus-server")]
#[command(about = "Wirebus WebSocket RPC server")]
struct Args {
    /// Port to listen on (HTTP + WebSocket)
    #[arg(short, long, default_value = "4010")]
    port: u16,

    /// Path to the token file mapping bearer tokens to identities
    #[arg(short, long, default_value = "wirebus-tokens.json")]
    auth_file: PathBuf,

    /// Path to the entity database
    #[arg(short, long, default_value = "wirebus.db")]
    database: PathBuf,

    /// Keep entities in memory instead of SQLite
    #[arg(long)]
    in_memory: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Wirebus server starting...");

    let store: Arc<dyn EntityStore> = if args.in_memory {
        info!("Using in-memory entity store");
        Arc::new(MemoryStore::new())
    } else {
        info!("Opening entity store at {:?}", args.database);
        Arc::new(SqliteStore::open(&args.database).context("failed to open entity database")?)
    };

    let resolver = Arc::new(
        TokenFileResolver::load(&args.auth_file)
            .with_context(|| format!("failed to load auth file {:?}", args.auth_file))?,
    );

    let state = build_state(store, resolver);
    info!(
        "Services registered: {}",
        state.identity.services.join(", ")
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;

    println!("\n========================================");
    println!("  Wirebus Server Running");
    println!("========================================");
    println!("  Port:      {}", args.port);
    println!("  Socket:    ws://0.0.0.0:{}/ws", args.port);
    println!("  Identity:  http://0.0.0.0:{}/api/v1/identity", args.port);
    println!("========================================\n");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
