//! Payment gateway (v1)
//!
//! Accepts payments over HTTP and delivers each to one of two processors.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────────┐
//!                       │                     PAYMENT GATEWAY                       │
//!                       │                                                           │
//!   POST /payments      │  ┌────────┐   ┌─────────┐   sync   ┌──────────────┐       │
//!   ────────────────────┼─▶│  http  │──▶│ service │─────────▶│   routing    │───────┼──▶ default
//!                       │  │ server │   │         │          │  failover    │───────┼──▶ fallback
//!                       │  └────────┘   └────┬────┘          └──────▲───────┘       │
//!                       │                    │ async                │               │
//!                       │                    ▼                      │               │
//!                       │             ┌──────────────┐              │               │
//!                       │             │  resilience  │──────────────┘               │
//!                       │             │ retry pool   │                              │
//!                       │             └──────┬───────┘                              │
//!                       │                    ▼                                      │
//!                       │             ┌──────────────┐      ┌──────────────┐        │
//!                       │             │    ledger    │      │    health    │◀───────┼─── polls
//!                       │             └──────────────┘      │  observers   │        │
//!                       │                                   └──────────────┘        │
//!                       └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use payment_gateway::config::load_config;
use payment_gateway::lifecycle::{build_parts, signals, start_gateway};
use payment_gateway::observability::{logging, metrics};
use payment_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "payment-gateway", version, about = "Payment gateway with processor failover")]
struct Args {
    /// Path to a TOML config file. Defaults plus environment are used without one.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("payment-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = ?config.gateway.mode,
        ledger = ?config.ledger.backend,
        concurrency = config.workers.concurrency,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let parts = build_parts(&config).await?;
    let gateway = start_gateway(&config, parts, &shutdown);
    signals::spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, gateway.service.clone());
    let result = server.run(listener, shutdown.clone()).await;

    // The server can also stop on its own error; make sure the rest follows.
    shutdown.trigger();
    gateway.drain().await;

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
