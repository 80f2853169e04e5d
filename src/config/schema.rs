//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid config.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Ordered pipeline stages.
    pub pipeline: PipelineConfig,

    /// Span export settings.
    pub tracing: TracingConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Prometheus metrics settings.
    pub metrics: MetricsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3004").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3004".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce response headers, in seconds.
    ///
    /// Does not apply to `/process` and does not bound `/stream` bodies.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted `/process` body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Pipeline definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stages, run in the order listed.
    pub stages: Vec<StageConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig::new("validate-input", 1000),
                StageConfig::new("process-data", 2000),
                StageConfig::new("store-results", 1500),
            ],
        }
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Stage name; also the stage's span name and `step` value.
    pub name: String,

    /// Simulated work duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl StageConfig {
    pub fn new(name: &str, duration_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            duration_ms,
        }
    }
}

/// Where finished spans go.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// Discard spans.
    None,
    /// Emit spans as debug log events.
    Log,
    /// POST span batches to `endpoint`.
    Collector,
}

/// Trace export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Enable span recording.
    pub enabled: bool,

    /// Exporter backend.
    pub exporter: ExporterKind,

    /// Collector endpoint (used by the `collector` exporter).
    pub endpoint: String,

    /// Service name attached to exported batches.
    pub service_name: String,

    /// Spans per collector request.
    pub batch_size: usize,

    /// Maximum time a span waits in the queue, in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exporter: ExporterKind::Log,
            endpoint: "http://localhost:4318/v1/traces".to_string(),
            service_name: "progress-relay".to_string(),
            batch_size: 64,
            flush_interval_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    Pretty,
    /// One JSON object per line for production.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
