//! Fan-out of progress notifications to live stream subscribers.
//!
//! # Data Flow
//! ```text
//! GET /stream
//!     → registry.rs (add ChannelSink, get SubscriberId)
//!
//! PipelineRunner
//!     → broadcaster.rs (sse-broadcast span, serialize once)
//!     → registry.rs snapshot → EventSink::send per subscriber
//!     → SSE response stream (http/stream.rs)
//! ```
//!
//! # Design Decisions
//! - The registry is the only state shared between concurrent calls
//! - Fan-out iterates a snapshot, never the live set
//! - A failed write removes that subscriber immediately and never affects
//!   delivery to the others
//! - No buffering or replay: a subscriber only sees messages broadcast
//!   while it is registered

pub mod broadcaster;
pub mod message;
pub mod registry;

pub use broadcaster::Broadcaster;
pub use message::{BroadcastMessage, StageStatus, TerminalKind};
pub use registry::{ChannelSink, EventSink, SinkError, Subscriber, SubscriberId, SubscriberRegistry};
