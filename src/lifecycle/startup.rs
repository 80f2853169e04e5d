//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the span exporter selected by config
//! - Degrade to a no-op tracer when the exporter cannot start
//! - Flush exported spans at shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::{ExporterKind, TracingConfig};
use crate::trace::collector::CollectorExporter;
use crate::trace::{LogExporter, NoopExporter, SpanExporter, Tracer};

/// The tracer plus the background worker that exports its spans, if any.
#[derive(Debug)]
pub struct TracerHandle {
    pub tracer: Tracer,
    worker: Option<JoinHandle<()>>,
}

impl TracerHandle {
    /// Wait for queued spans to be exported.
    ///
    /// The worker drains once every `Tracer` clone and open span is dropped,
    /// so call this after the server has stopped. Gives up after `timeout`.
    pub async fn flush(self, timeout: Duration) {
        let Self { tracer, worker } = self;
        drop(tracer);
        if let Some(worker) = worker {
            if tokio::time::timeout(timeout, worker).await.is_err() {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Span exporter did not flush in time");
            }
        }
    }
}

/// Build the tracer described by `config`.
///
/// Never fails: exporter setup errors are logged and tracing continues with
/// a no-op exporter.
pub fn init_tracer(config: &TracingConfig) -> TracerHandle {
    let service = config.service_name.as_str();
    if !config.enabled {
        tracing::info!("Span recording disabled");
        return TracerHandle {
            tracer: Tracer::new(service, Arc::new(NoopExporter)),
            worker: None,
        };
    }

    let (exporter, worker): (Arc<dyn SpanExporter>, Option<JoinHandle<()>>) = match config.exporter {
        ExporterKind::None => (Arc::new(NoopExporter), None),
        ExporterKind::Log => (Arc::new(LogExporter), None),
        ExporterKind::Collector => match CollectorExporter::spawn(config) {
            Ok((exporter, worker)) => (Arc::new(exporter), Some(worker)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize trace exporter, continuing without tracing");
                (Arc::new(NoopExporter), None)
            }
        },
    };

    let tracer = Tracer::new(service, exporter);
    tracing::info!(service_name = tracer.service_name(), exporter = ?config.exporter, "Tracing initialized");
    TracerHandle { tracer, worker }
}
