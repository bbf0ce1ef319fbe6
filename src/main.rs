//! MCP gateway binary.
//!
//! Loads the config file, installs logging and metrics, then serves until
//! SIGINT/SIGTERM. Edits to the config file are applied without a restart.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mcp_gateway::config::{load_config, ConfigWatcher};
use mcp_gateway::lifecycle::{wait_for_shutdown_signal, Shutdown};
use mcp_gateway::observability::{logging, metrics};
use mcp_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "mcp-gateway", version)]
#[command(about = "Reverse gateway for MCP servers with credential injection", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Validate the configuration, resolve secrets and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    if args.check {
        HttpServer::new(config.clone())?;
        println!(
            "{}: ok ({} routes, {} backends)",
            args.config.display(),
            config.routes.len(),
            config.backends.len()
        );
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "mcp-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config.clone())?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.trigger();
    });

    let (watcher, updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable; hot reload disabled");
            None
        }
    };

    server.run(listener, updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
