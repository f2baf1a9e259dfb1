//! Directory API observability service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TraceLayer ─▶ CatchPanic ─▶ observe ─▶ Timeout ─▶ authenticate ─▶ handler
//!                                                   │
//!                                  correlation id, body capture, response tap
//!                                                   │
//!                         ┌─────────────────────────┴──────────────────────┐
//!                         ▼                                                ▼
//!                  AuditRecorder                                PerformanceCollector
//!              (mask, truncate, log)                         (categorise, success flag)
//!                         │                                                │
//!                  bounded queue                                    bounded queue
//!                         ▼                                                ▼
//!                   AuditStore                                    PerformanceStore
//!                                                                          │
//!                                                      AggregationEngine ◀─┘
//!                                                      (reporting API)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;

use directory_observability::config::loader::load_config;
use directory_observability::config::AppConfig;
use directory_observability::lifecycle::signals::spawn_signal_handler;
use directory_observability::observability::{logging, metrics};
use directory_observability::store::MemoryStore;
use directory_observability::{HttpServer, Pipeline, Shutdown};

#[derive(Parser)]
#[command(name = "directory-observability")]
#[command(about = "Observed directory API with audit trail and performance reporting", long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "directory-observability starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        audit_enabled = config.audit.enabled,
        performance_enabled = config.performance.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::start(config, store.clone(), store);

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(pipeline.state(), Router::new());
    server.run(listener, shutdown.subscribe()).await?;

    pipeline.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
