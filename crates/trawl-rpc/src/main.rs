//! Trawl RPC Server - JSON-RPC backend for model discovery and learning.
//!
//! This binary provides a JSON-RPC 2.0 server that wraps the trawl-core
//! library for whatever CLI or UI drives it.

mod handler;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use trawl_core::TrawlApi;

#[derive(Parser, Debug)]
#[command(name = "trawl-rpc")]
#[command(about = "JSON-RPC server for Trawl model discovery and learning")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Data directory for config, caches and learning results
    /// (defaults to the platform data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Do not start the continuous discovery loop
    #[arg(long)]
    no_discovery: bool,

    /// Do not start the learning worker pool
    #[arg(long)]
    no_learning: bool,

    /// Skip the well-known per-user and system model folders
    #[arg(long)]
    no_default_roots: bool,

    /// Skip probing mounted volumes for extra scan roots
    #[arg(long)]
    no_volumes: bool,
}

fn init_logging(args: &Args) {
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if args.json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("trawl"))
        .context("No platform data directory; pass --data-dir")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting Trawl RPC Server");

    let data_dir = match args.data_dir.clone() {
        Some(path) => path,
        None => default_data_dir()?,
    };
    info!("Data directory: {}", data_dir.display());

    let mut builder = TrawlApi::builder(&data_dir).auto_create_dirs(true);
    if args.no_default_roots {
        builder = builder.scan_default_roots(false);
    }
    if args.no_volumes {
        builder = builder.scan_volumes(false);
    }
    let api = builder
        .build()
        .await
        .with_context(|| format!("Failed to initialize Trawl at {}", data_dir.display()))?;

    if !args.no_discovery {
        api.start_discovery().await;
    }
    if !args.no_learning {
        api.start_learning();
    }

    let (addr, state) = server::start_server(api, &args.host, args.port).await?;

    // Print port for the parent process to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Err(e) = state.api.shutdown().await {
        warn!("Shutdown finished with errors: {}", e);
    }

    Ok(())
}
