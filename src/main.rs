//! Gateway admission core (binary).
//!
//! An API-gateway front built with Tokio and Axum: every inbound request is
//! attributed to a rate-limit partition key, admitted through a token
//! bucket, authenticated against a bearer token, and forwarded to the
//! configured upstream with the `x-ca-*` security header set attached.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ auth (context populate)
//!                        │                 │
//!                        ▼                 ▼
//!                   rate limiter ◀── key resolver
//!                        │
//!                        ▼ (admitted)
//!                 forward handler ── x-ca-* headers ──▶ Upstream
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use auth_gateway::config::loader::load_config;
use auth_gateway::config::GatewayConfig;
use auth_gateway::http::GatewayServer;
use auth_gateway::lifecycle::Shutdown;
use auth_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "auth-gateway", about = "API gateway admission core")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration before logging so the configured level applies.
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!("auth-gateway v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        rate_limit_enabled = config.rate_limit.enabled,
        auth_enabled = config.auth.enabled,
        "Configuration loaded"
    );

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    // Initialize metrics server
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

    // Translate Ctrl+C into the broadcast shutdown signal.
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
            }
        });
    }

    // Create and run the gateway server
    let server = GatewayServer::new(config);
    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
