//! Progress relay library: traced pipeline runs broadcast over server-sent events.

pub mod broadcast;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod trace;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
