use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use exchange_observation::config::{load_config, ObservationConfig};
use exchange_observation::http::{shutdown_signal, HttpServer};
use exchange_observation::observability::{init_logging, init_metrics};

/// Demo host for observed HTTP exchanges.
#[derive(Debug, Parser)]
#[command(name = "exchange-observation", version)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ObservationConfig::default(),
    };

    init_logging(&config.logging)?;

    tracing::info!("exchange-observation v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address,
        request_timeout_secs = config.server.request_timeout_secs,
        upstream = ?config.server.upstream_address,
        enabled = config.enabled,
        "Configuration loaded"
    );

    if config.enabled && config.metrics.enabled {
        if let Some(address) = &config.metrics.exporter_address {
            match address.parse::<SocketAddr>() {
                Ok(addr) => {
                    if let Err(e) = init_metrics(addr) {
                        tracing::error!(error = %e, "Failed to start metrics exporter");
                    }
                }
                Err(_) => tracing::error!(
                    metrics_address = %address,
                    "Failed to parse metrics address"
                ),
            }
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config);
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
