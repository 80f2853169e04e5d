//! Destinations for finished spans.

use std::sync::Mutex;

use crate::trace::span::{SpanData, SpanStatus};

/// Receives every finished span exactly once.
///
/// Called from the thread that ended the span; implementations must not block.
pub trait SpanExporter: Send + Sync {
    fn export(&self, span: SpanData);
}

/// Discards spans.
#[derive(Debug, Default)]
pub struct NoopExporter;

impl SpanExporter for NoopExporter {
    fn export(&self, _span: SpanData) {}
}

/// Writes each finished span as a structured log event.
#[derive(Debug, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    fn export(&self, span: SpanData) {
        let duration_us = span
            .end_time_unix_nano
            .unwrap_or(span.start_time_unix_nano)
            .saturating_sub(span.start_time_unix_nano)
            / 1_000;
        let status = match &span.status {
            SpanStatus::Unset => "unset",
            SpanStatus::Ok => "ok",
            SpanStatus::Error { .. } => "error",
        };
        tracing::debug!(
            target: "progress_relay::spans",
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = ?span.parent_span_id.map(|id| id.to_string()),
            name = %span.name,
            status,
            duration_us,
            events = span.events.len(),
            "span finished"
        );
    }
}

/// Keeps finished spans in memory.
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    spans: Mutex<Vec<SpanData>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every span exported so far, in end order.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        match self.spans.lock() {
            Ok(spans) => spans.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, span: SpanData) {
        match self.spans.lock() {
            Ok(mut spans) => spans.push(span),
            Err(poisoned) => poisoned.into_inner().push(span),
        }
    }
}
