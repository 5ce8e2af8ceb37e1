//! Single-hop HTTP reverse forwarder.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                  REVERSE FORWARDER                   │
//!                    │                                                      │
//!  Client Request    │  ┌─────────┐   ┌──────────┐   ┌───────────────────┐  │
//!  ──────────────────┼─▶│  http   │──▶│ routing  │──▶│ session (cookie   │  │
//!                    │  │ server  │   │  table   │   │ jar per session)  │  │
//!                    │  └─────────┘   └──────────┘   └─────────┬─────────┘  │
//!                    │                                         ▼            │
//!                    │  ┌──────────────────────────────────────────────┐    │
//!                    │  │ proxy: forwarder → transport → translator    │────┼──▶ Upstream
//!                    │  └──────────────────────────────────────────────┘    │
//!  Client Response   │                       │                              │
//!  ◀─────────────────┼───────────────────────┘                              │
//!                    │                                                      │
//!                    │  config + hot reload · observability · lifecycle     │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use reverse_forwarder::config::{load_config, watcher::ConfigWatcher, ForwarderConfig};
use reverse_forwarder::http::HttpServer;
use reverse_forwarder::lifecycle::{signals, Shutdown};
use reverse_forwarder::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "reverse-forwarder")]
#[command(about = "Single-hop HTTP reverse forwarder", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration, print the routes and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ForwarderConfig::default(),
    };

    if cli.check {
        println!("configuration OK: {} route(s)", config.routes.len());
        for route in &config.routes {
            println!(
                "  {:<20} {:<30} -> {}{}",
                route.name,
                route.path,
                route.target_url,
                if route.active { "" } else { " (inactive)" }
            );
        }
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!("reverse-forwarder v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    // Hot reload only when a file was given; the watcher handle must outlive the server.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
