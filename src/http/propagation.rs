//! Inbound trace-context extraction.

use axum::http::HeaderMap;

use crate::trace::TraceScope;

/// W3C trace-context header name.
pub const TRACEPARENT: &str = "traceparent";

/// The scope an inbound request starts in.
///
/// A valid `traceparent` continues the caller's trace; anything else starts
/// a fresh root.
pub fn scope_from_headers(headers: &HeaderMap) -> TraceScope {
    headers
        .get(TRACEPARENT)
        .and_then(|value| value.to_str().ok())
        .and_then(TraceScope::from_traceparent)
        .unwrap_or_else(TraceScope::root)
}
