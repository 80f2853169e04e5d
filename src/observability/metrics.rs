//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_broadcasts_total` (counter): broadcasts attempted
//! - `relay_broadcast_deliveries_total` (counter): per-subscriber writes by `result`
//! - `relay_subscribers_active` (gauge): open `/stream` connections
//! - `relay_pipeline_runs_total` (counter): finished runs by `outcome`
//! - `relay_pipeline_run_duration_seconds` (histogram)
//! - `relay_stage_duration_seconds` (histogram): per `stage`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
///
/// Failure is logged; the service runs on without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_broadcast(delivered: usize, failed: usize) {
    counter!("relay_broadcasts_total").increment(1);
    if delivered > 0 {
        counter!("relay_broadcast_deliveries_total", "result" => "delivered").increment(delivered as u64);
    }
    if failed > 0 {
        counter!("relay_broadcast_deliveries_total", "result" => "failed").increment(failed as u64);
    }
}

pub fn set_active_subscribers(count: usize) {
    gauge!("relay_subscribers_active").set(count as f64);
}

pub fn record_run(outcome: &'static str, started: Instant) {
    counter!("relay_pipeline_runs_total", "outcome" => outcome).increment(1);
    histogram!("relay_pipeline_run_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_stage(stage: &str, started: Instant) {
    histogram!("relay_stage_duration_seconds", "stage" => stage.to_string())
        .record(started.elapsed().as_secs_f64());
}
