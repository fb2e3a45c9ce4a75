//! Hybrid static/dynamic site server.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  HYBRID SERVE                     │
//!                        │                                                   │
//!     Client Request     │  ┌─────────┐    ┌───────────┐    ┌────────────┐  │
//!     ───────────────────┼─▶│  http   │───▶│  routing  │───▶│  static    │  │
//!                        │  │ server  │    │ manifest  │    │  file/304  │  │
//!                        │  └─────────┘    │ dispatch  │    └────────────┘  │
//!                        │                 └─────┬─────┘                    │
//!                        │                       │ miss                     │
//!                        │               ┌───────┴────────┐                 │
//!                        │               ▼                ▼                 │
//!                        │        ┌────────────┐   ┌────────────┐          │
//!                        │        │  render    │◀──│    isr     │          │
//!                        │        │ (upstream) │   │   cache    │          │
//!                        │        └────────────┘   └────────────┘          │
//!                        │                                                   │
//!                        │  config · lifecycle · observability              │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hybrid_serve::config::{load_config, ServerConfig};
use hybrid_serve::lifecycle::{self, Shutdown};
use hybrid_serve::observability::{logging, metrics};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "hybrid-serve")]
#[command(
    about = "Serve prebuilt static assets with on-demand rendering fallback",
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("hybrid-serve v{} starting", env!("CARGO_PKG_VERSION"));

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

    // Manifest, build id and cache must all be in place before binding.
    let server = lifecycle::prepare(&config).await?;

    let bind_address = config.listener.resolve();
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        isr_enabled = config.isr.is_some(),
        "Server listening"
    );

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    lifecycle::spawn_signal_listener(shutdown.clone());

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
