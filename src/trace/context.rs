//! Span identity and the per-call trace scope.

use std::fmt;

use serde::{Serialize, Serializer};

/// 128-bit trace identifier shared by every span of one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a random, non-zero trace id.
    pub fn random() -> Self {
        loop {
            let id: u128 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Parse 32 lowercase/uppercase hex characters. Zero is invalid.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        match u128::from_str_radix(s, 16) {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(Self(id)),
        }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 64-bit span identifier, unique within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a random, non-zero span id.
    pub fn random() -> Self {
        loop {
            let id: u64 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Parse 16 hex characters. Zero is invalid.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        match u64::from_str_radix(s, 16) {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(Self(id)),
        }
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity of one span inside its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

/// The span currently active for one logical call.
///
/// Passed by value down the call chain and across await points. A child span
/// started from a scope records the scope's span as its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceScope {
    active: Option<SpanContext>,
}

impl TraceScope {
    /// A scope with no active span; spans started here are trace roots.
    pub fn root() -> Self {
        Self { active: None }
    }

    /// A scope whose active span is `context`.
    pub fn with_active(context: SpanContext) -> Self {
        Self {
            active: Some(context),
        }
    }

    pub fn active(&self) -> Option<SpanContext> {
        self.active
    }

    /// Continue a remote trace from a W3C `traceparent` header value.
    ///
    /// Accepts `<version>-<trace-id>-<parent-id>-<flags>`. Version `ff` and
    /// all-zero ids are rejected.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || version.eq_ignore_ascii_case("ff") {
            return None;
        }
        u8::from_str_radix(version, 16).ok()?;
        if flags.len() != 2 || u8::from_str_radix(flags, 16).is_err() {
            return None;
        }
        // Version 00 defines exactly four fields.
        if version == "00" && parts.next().is_some() {
            return None;
        }

        Some(Self::with_active(SpanContext {
            trace_id: TraceId::from_hex(trace_id)?,
            span_id: SpanId::from_hex(parent_id)?,
        }))
    }

    /// Render the active span as a `traceparent` header value (sampled).
    pub fn to_traceparent(&self) -> Option<String> {
        self.active
            .map(|ctx| format!("00-{}-{}-01", ctx.trace_id, ctx.span_id))
    }
}
