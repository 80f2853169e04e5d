//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!     → crate::trace (request-correlated span tree, exported separately)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Trace collector (HTTP, see trace::collector)
//! ```
//!
//! # Design Decisions
//! - Every initializer here is non-fatal: a failure is logged and the
//!   service keeps serving
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
