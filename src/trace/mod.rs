//! Hierarchical span recording.
//!
//! # Data Flow
//! ```text
//! handler entry
//!     → context.rs (TraceScope: root, or continued from `traceparent`)
//!     → tracer.rs (start_span: parent id captured from the scope)
//!     → span.rs (events, status, end exactly once)
//!     → export.rs / collector.rs + otlp.rs (finished SpanData leaves the process)
//! ```
//!
//! # Design Decisions
//! - There is no ambient "current span". Every call that may open a child
//!   span receives the caller's `TraceScope` as a plain value, so runs that
//!   interleave on one thread at await points never see each other's spans.
//! - `Span::end` consumes the span; `Drop` ends spans that were abandoned.
//! - Exporting never blocks the caller.

pub mod collector;
pub mod context;
pub mod export;
pub mod otlp;
pub mod span;
pub mod tracer;

pub use context::{SpanContext, SpanId, TraceId, TraceScope};
pub use export::{InMemoryExporter, LogExporter, NoopExporter, SpanExporter};
pub use span::{Span, SpanData, SpanEvent, SpanStatus};
pub use tracer::Tracer;
