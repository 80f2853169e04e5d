//! OTLP/HTTP JSON encoding of finished spans.
//!
//! Produces the `ExportTraceServiceRequest` document accepted at
//! `POST /v1/traces` by OpenTelemetry collectors, Jaeger and Tempo. Ids are
//! lowercase hex and 64-bit integers are decimal strings, as the OTLP JSON
//! mapping requires.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::trace::span::{SpanData, SpanEvent, SpanStatus};

const SCOPE_NAME: &str = "progress-relay";
const SPAN_KIND_INTERNAL: u8 = 1;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Resource,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Serialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct ScopeSpans {
    pub scope: InstrumentationScope,
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Serialize)]
pub struct InstrumentationScope {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub kind: u8,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Vec<KeyValue>,
    pub events: Vec<OtlpEvent>,
    pub status: OtlpStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpEvent {
    pub time_unix_nano: String,
    pub name: String,
    pub attributes: Vec<KeyValue>,
}

/// `code`: 0 unset, 1 ok, 2 error.
#[derive(Debug, Serialize)]
pub struct OtlpStatus {
    pub code: u8,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnyValue {
    StringValue(String),
    BoolValue(bool),
    IntValue(String),
    DoubleValue(f64),
    ArrayValue { values: Vec<AnyValue> },
    KvlistValue { values: Vec<KeyValue> },
}

impl From<&Value> for AnyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => AnyValue::StringValue("null".to_string()),
            Value::Bool(b) => AnyValue::BoolValue(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AnyValue::IntValue(i.to_string()),
                None => AnyValue::DoubleValue(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => AnyValue::StringValue(s.clone()),
            Value::Array(items) => AnyValue::ArrayValue {
                values: items.iter().map(AnyValue::from).collect(),
            },
            Value::Object(map) => AnyValue::KvlistValue {
                values: attributes(map),
            },
        }
    }
}

fn attributes(map: &Map<String, Value>) -> Vec<KeyValue> {
    map.iter()
        .map(|(key, value)| KeyValue {
            key: key.clone(),
            value: value.into(),
        })
        .collect()
}

fn event(event: &SpanEvent) -> OtlpEvent {
    OtlpEvent {
        time_unix_nano: event.time_unix_nano.to_string(),
        name: event.name.clone(),
        attributes: attributes(&event.attributes),
    }
}

fn span(span: &SpanData) -> OtlpSpan {
    let status = match &span.status {
        SpanStatus::Unset => OtlpStatus { code: 0, message: String::new() },
        SpanStatus::Ok => OtlpStatus { code: 1, message: String::new() },
        SpanStatus::Error { message } => OtlpStatus {
            code: 2,
            message: message.clone(),
        },
    };
    OtlpSpan {
        trace_id: span.trace_id.to_string(),
        span_id: span.span_id.to_string(),
        parent_span_id: span.parent_span_id.map(|id| id.to_string()),
        name: span.name.to_string(),
        kind: SPAN_KIND_INTERNAL,
        start_time_unix_nano: span.start_time_unix_nano.to_string(),
        end_time_unix_nano: span
            .end_time_unix_nano
            .unwrap_or(span.start_time_unix_nano)
            .to_string(),
        attributes: Vec::new(),
        events: span.events.iter().map(event).collect(),
        status,
    }
}

/// Wrap a batch of spans from one service in a single export request.
pub fn encode(service_name: &str, spans: &[SpanData]) -> ExportTraceRequest {
    ExportTraceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Resource {
                attributes: vec![KeyValue {
                    key: "service.name".to_string(),
                    value: AnyValue::StringValue(service_name.to_string()),
                }],
            },
            scope_spans: vec![ScopeSpans {
                scope: InstrumentationScope {
                    name: SCOPE_NAME,
                    version: env!("CARGO_PKG_VERSION"),
                },
                spans: spans.iter().map(span).collect(),
            }],
        }],
    }
}
