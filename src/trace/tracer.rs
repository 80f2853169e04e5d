//! Span factory bound to one exporter.

use std::borrow::Cow;
use std::sync::Arc;

use crate::trace::context::{TraceId, TraceScope};
use crate::trace::export::{NoopExporter, SpanExporter};
use crate::trace::span::Span;

/// Starts spans and routes finished ones to an exporter.
///
/// Cheap to clone; every clone shares the exporter.
#[derive(Clone)]
pub struct Tracer {
    service_name: Arc<str>,
    exporter: Arc<dyn SpanExporter>,
}

impl Tracer {
    pub fn new(service_name: impl Into<Arc<str>>, exporter: Arc<dyn SpanExporter>) -> Self {
        Self {
            service_name: service_name.into(),
            exporter,
        }
    }

    /// A tracer that discards every span.
    pub fn noop() -> Self {
        Self::new("noop", Arc::new(NoopExporter))
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Start a span whose parent is the active span of `scope`.
    ///
    /// The parent id is captured here and never re-read, so the span keeps a
    /// stable parent no matter what other calls run before it ends.
    pub fn start_span(&self, name: impl Into<Cow<'static, str>>, scope: &TraceScope) -> Span {
        let (trace_id, parent) = match scope.active() {
            Some(parent) => (parent.trace_id, Some(parent.span_id)),
            None => (TraceId::random(), None),
        };
        Span::start(name.into(), trace_id, parent, self.exporter.clone())
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}
