//! Progress relay (v1)
//!
//! Runs a fixed sequence of stages for each `POST /process` request and
//! pushes every stage transition to all `GET /stream` subscribers.
//!
//! # Architecture Overview
//!
//! ```text
//!     POST /process ──▶ http::process ──▶ pipeline::PipelineRunner
//!                                              │  (root span, stage spans)
//!                                              ▼
//!                                      broadcast::Broadcaster
//!                                              │  (sse-broadcast span)
//!                                              ▼
//!     GET /stream  ◀── http::stream ◀── broadcast::SubscriberRegistry
//!
//!     Cross-cutting: config, trace (explicit TraceScope), observability
//!     (logging + metrics), lifecycle (startup, signals, shutdown)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use progress_relay::config::{load_config, ServiceConfig};
use progress_relay::http::HttpServer;
use progress_relay::lifecycle::{init_tracer, signals::wait_for_signal, Shutdown};
use progress_relay::observability::{logging::init_logging, metrics::init_metrics};

#[derive(Parser)]
#[command(name = "progress-relay")]
#[command(about = "Traced pipeline runs broadcast over server-sent events", long_about = None)]
struct Args {
    /// Path to a TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "progress-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        stages = config.pipeline.stages.len(),
        exporter = ?config.tracing.exporter,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let tracer_handle = init_tracer(&config.tracing);

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(config, tracer_handle.tracer.clone());
    server.run(listener, server_shutdown).await?;

    tracer_handle.flush(Duration::from_secs(5)).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
