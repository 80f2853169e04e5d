//! Batched span export to a remote trace collector over OTLP/HTTP.
//!
//! # Responsibilities
//! - Queue finished spans without blocking the code that ended them
//! - Flush batches by size or on a fixed interval
//! - POST each batch as an OTLP JSON document (see `otlp.rs`) to the
//!   configured `/v1/traces` endpoint
//!
//! # Design Decisions
//! - Unbounded queue: spans are small and the service has no backpressure
//! - A failed POST is logged and the batch dropped; no retries
//! - The worker drains and exits once every tracer handle is gone

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use url::Url;

use crate::config::TracingConfig;
use crate::trace::export::SpanExporter;
use crate::trace::otlp;
use crate::trace::span::SpanData;

/// Errors raised while setting up the collector exporter.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid collector endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to build collector client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Span exporter that ships batches to a collector endpoint.
#[derive(Debug)]
pub struct CollectorExporter {
    queue: mpsc::UnboundedSender<SpanData>,
}

impl CollectorExporter {
    /// Validate the endpoint and start the background flush worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: &TracingConfig) -> Result<(Self, JoinHandle<()>), ExportError> {
        let endpoint = parse_endpoint(&config.endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let (queue, rx) = mpsc::unbounded_channel();
        let worker = FlushWorker {
            client,
            endpoint,
            service_name: config.service_name.clone(),
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
        };
        let handle = tokio::spawn(worker.run(rx));

        tracing::info!(
            endpoint = %config.endpoint,
            batch_size = config.batch_size,
            "Trace collector exporter started"
        );
        Ok((Self { queue }, handle))
    }
}

impl SpanExporter for CollectorExporter {
    fn export(&self, span: SpanData) {
        if self.queue.send(span).is_err() {
            tracing::debug!("Trace collector worker gone, dropping span");
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ExportError> {
    let invalid = |reason: String| ExportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };
    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

struct FlushWorker {
    client: reqwest::Client,
    endpoint: Url,
    service_name: String,
    batch_size: usize,
    flush_interval: Duration,
}

impl FlushWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<SpanData>) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(span) => {
                            batch.push(span);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut batch).await;
                }
            }
        }

        self.flush(&mut batch).await;
        tracing::debug!("Trace collector worker stopped");
    }

    async fn flush(&self, batch: &mut Vec<SpanData>) {
        if batch.is_empty() {
            return;
        }
        let body = otlp::encode(&self.service_name, batch.as_slice());
        let result = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .and_then(|res| res.error_for_status());

        match result {
            Ok(_) => tracing::trace!(spans = batch.len(), "Exported span batch"),
            Err(e) => tracing::warn!(
                error = %e,
                spans = batch.len(),
                endpoint = %self.endpoint,
                "Failed to export span batch, dropping it"
            ),
        }
        batch.clear();
    }
}
