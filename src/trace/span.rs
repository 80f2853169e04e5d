//! A single timed unit of traced work.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::trace::context::{SpanContext, SpanId, TraceId, TraceScope};
use crate::trace::export::SpanExporter;

/// Final outcome recorded on a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "lowercase")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error { message: String },
}

/// A timestamped annotation on a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    pub name: String,
    pub attributes: Map<String, Value>,
    pub time_unix_nano: u64,
}

/// The exported form of a span.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanData {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: Cow<'static, str>,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: Option<u64>,
    pub status: SpanStatus,
    pub events: Vec<SpanEvent>,
}

impl SpanData {
    /// Find the first event with the given name.
    pub fn event(&self, name: &str) -> Option<&SpanEvent> {
        self.events.iter().find(|e| e.name == name)
    }
}

/// An open span.
///
/// Owned by the call that started it. `end` consumes the span so it cannot be
/// ended twice; a span dropped without `end` is ended on drop.
pub struct Span {
    data: SpanData,
    exporter: Arc<dyn SpanExporter>,
    ended: bool,
}

impl Span {
    pub(crate) fn start(
        name: Cow<'static, str>,
        trace_id: TraceId,
        parent_span_id: Option<SpanId>,
        exporter: Arc<dyn SpanExporter>,
    ) -> Self {
        Self {
            data: SpanData {
                trace_id,
                span_id: SpanId::random(),
                parent_span_id,
                name,
                start_time_unix_nano: unix_nanos(SystemTime::now()),
                end_time_unix_nano: None,
                status: SpanStatus::Unset,
                events: Vec::new(),
            },
            exporter,
            ended: false,
        }
    }

    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.data.trace_id,
            span_id: self.data.span_id,
        }
    }

    /// The scope in which this span is the active span.
    pub fn scope(&self) -> TraceScope {
        TraceScope::with_active(self.context())
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.data.parent_span_id
    }

    pub fn status(&self) -> &SpanStatus {
        &self.data.status
    }

    /// Record an event without attributes.
    pub fn add_event(&mut self, name: impl Into<String>) {
        self.push_event(name.into(), Map::new());
    }

    /// Record an event with attributes.
    pub fn add_event_with<I, K>(&mut self, name: impl Into<String>, attributes: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect();
        self.push_event(name.into(), attributes);
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        self.data.status = status;
    }

    /// End the span and hand it to the exporter.
    pub fn end(mut self) {
        self.finish();
    }

    fn push_event(&mut self, name: String, attributes: Map<String, Value>) {
        self.data.events.push(SpanEvent {
            name,
            attributes,
            time_unix_nano: unix_nanos(SystemTime::now()),
        });
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.data.end_time_unix_nano = Some(unix_nanos(SystemTime::now()));
        let data = SpanData {
            events: std::mem::take(&mut self.data.events),
            ..self.data.clone()
        };
        self.exporter.export(data);
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if !self.ended {
            tracing::trace!(span = %self.data.name, "span dropped without end, ending it");
            self.finish();
        }
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.data.name)
            .field("trace_id", &self.data.trace_id)
            .field("span_id", &self.data.span_id)
            .field("parent_span_id", &self.data.parent_span_id)
            .finish()
    }
}

pub(crate) fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
