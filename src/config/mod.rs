//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → consumed once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The trace collector endpoint is checked when the exporter starts, not
//!   here, so a bad endpoint degrades tracing instead of blocking startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ExporterKind, LimitsConfig, ListenerConfig, LogFormat, LoggingConfig, MetricsConfig,
    PipelineConfig, ServiceConfig, StageConfig, TimeoutConfig, TracingConfig,
};
