//! Concurrent static file server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ listener ──▶ dispatch queue ──▶ worker pool (N)
//!                   │            (bounded)            │
//!                   └── queue full: 503, close        ▼
//!                                          rate limit → method guard
//!                                                     │
//!                                   /health, /metrics │ static files
//!                                                     ▼
//!                                    cache ──miss──▶ resolver ──▶ disk
//!
//!     Cross-cutting: config, logging, metrics, lifecycle
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use file_server::config::{self, validate_config, ConfigError, ServerConfig};
use file_server::lifecycle::{self, Shutdown};
use file_server::observability::{logging, metrics};
use file_server::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "file-server", version)]
#[command(about = "Serve a directory over HTTP with caching and rate limiting", long_about = None)]
struct Cli {
    /// Document root to serve.
    #[arg(short, long)]
    root: PathBuf,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind.
    #[arg(long)]
    host: Option<String>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_default()?,
    };

    config.files.root = cli.root.clone();
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(host) = &cli.host {
        config.listener.host = host.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "file-server starting");

    tracing::info!(
        bind_address = %config.bind_address(),
        root = %config.files.root.display(),
        workers = config.listener.thread_pool_size,
        rate_limit = config.security.rate_limit,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    if config.observability.prometheus_enabled {
        match config.observability.prometheus_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_prometheus(addr) {
                    tracing::error!(error = %e, "Failed to install Prometheus exporter");
                }
            }
            Err(_) => tracing::error!(
                prometheus_address = %config.observability.prometheus_address,
                "Failed to parse Prometheus address"
            ),
        }
    }

    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let stop = shutdown.subscribe();
    let server = HttpServer::new(config)?;
    let signals = lifecycle::trigger_on_signal(Arc::clone(&shutdown));

    server.run(listener, stop).await?;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
