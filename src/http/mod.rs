//! HTTP surface of the relay.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, middleware, graceful shutdown)
//!     → propagation.rs (traceparent → TraceScope)
//!     → stream.rs   GET  /stream   (register subscriber, SSE body)
//!     → process.rs  POST /process  (spawned pipeline run)
//!     → health.rs   GET  /health
//! ```

pub mod health;
pub mod process;
pub mod propagation;
pub mod server;
pub mod stream;

pub use server::{AppState, HttpServer, ServerError};
