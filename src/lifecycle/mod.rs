//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init logging → Init tracer/metrics (non-fatal) → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Close subscriber streams → Drain connections
//!     → Flush span exporter → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then observability, then listeners
//! - Observability init never aborts startup
//! - Shutdown waits a bounded time for the span exporter to flush

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{init_tracer, TracerHandle};
