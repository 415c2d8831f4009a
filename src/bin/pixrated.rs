//! pixrate daemon - WebSocket image rating relay
//!
//! Serves the images in a directory for rating, persists submitted
//! ratings and pushes each image's updated feed to every other client.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:8765, ./pics, ./ratings)
//! pixrated
//!
//! # Custom address and directories
//! pixrated --addr 0.0.0.0:9000 --pics-dir /srv/pics --data-dir /var/lib/pixrate
//!
//! # Same, from the environment
//! PIXRATE_ADDR=0.0.0.0:9000 PIXRATE_PICS_DIR=/srv/pics pixrated
//!
//! # Keep ratings in memory only
//! pixrated --memory-store
//!
//! # Enable debug logging
//! RUST_LOG=pixrated=debug pixrated
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pixrated::config::{
    ServerConfig, DEFAULT_BIND_ADDR, DEFAULT_DATA_DIR, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_OUTBOUND_CAPACITY, DEFAULT_PICS_DIR,
};
use pixrated::registry::spawn_registry;
use pixrated::server::RatingServer;
use pixrated::store::{FileRatingStore, MemoryRatingStore, RatingStore};

/// pixrate daemon - real-time image rating relay
#[derive(Parser, Debug)]
#[command(name = "pixrated", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PIXRATE_ADDR", default_value = DEFAULT_BIND_ADDR)]
    addr: SocketAddr,

    /// Directory of images offered for rating
    #[arg(long, env = "PIXRATE_PICS_DIR", default_value = DEFAULT_PICS_DIR)]
    pics_dir: PathBuf,

    /// Directory where rating records are written
    #[arg(long, env = "PIXRATE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Seconds between heartbeats
    #[arg(long, env = "PIXRATE_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Outbound frames buffered per client
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    outbound_capacity: usize,

    /// Largest inbound text frame in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Keep ratings in memory instead of writing them to the data directory
    #[arg(long)]
    memory_store: bool,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        if self.heartbeat_secs == 0 {
            bail!("Heartbeat interval must be at least one second");
        }

        Ok(ServerConfig {
            bind_addr: self.addr,
            pics_dir: self.pics_dir.clone(),
            data_dir: self.data_dir.clone(),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            outbound_capacity: self.outbound_capacity,
            max_message_size: self.max_message_size,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pixrated=info".parse()?)
                .add_directive("pixrate_core=info".parse()?)
                .add_directive("pixrate_protocol=info".parse()?),
        )
        .init();

    let config = args.server_config().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pixrate daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Spawn the connection registry
    let registry = spawn_registry();
    info!("Connection registry started");

    let store: Arc<dyn RatingStore> = if args.memory_store {
        info!("Using in-memory rating store");
        Arc::new(MemoryRatingStore::new())
    } else {
        info!(dir = %config.data_dir.display(), "Using file rating store");
        Arc::new(FileRatingStore::new(config.data_dir.clone()))
    };

    info!(
        addr = %config.bind_addr,
        pics_dir = %config.pics_dir.display(),
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        "Starting server"
    );

    let server = RatingServer::new(config, registry, store, cancel_token);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("pixrate daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
