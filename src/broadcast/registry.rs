//! Set of connected stream subscribers.
//!
//! # Responsibilities
//! - Track the sinks of currently open `/stream` connections
//! - Hand out snapshots for fan-out so the live set is never iterated while
//!   a subscriber connects or disconnects
//!
//! # Design Decisions
//! - Concurrent map keyed by a registry-assigned id; removal is idempotent
//! - The registry never writes to sinks itself; write failures belong to the
//!   broadcaster

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Error returned when a sink can no longer accept messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("subscriber connection closed")]
    Closed,
}

/// A writable push-stream endpoint.
pub trait EventSink: Send + Sync {
    /// Queue one serialized message for delivery.
    fn send(&self, payload: &Arc<str>) -> Result<(), SinkError>;
}

/// Sink backed by an unbounded channel feeding an SSE response body.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Arc<str>>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, payload: &Arc<str>) -> Result<(), SinkError> {
        self.tx.send(payload.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Identity of one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered subscriber as seen in a snapshot.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sink: Arc<dyn EventSink>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn send(&self, payload: &Arc<str>) -> Result<(), SinkError> {
        self.sink.send(payload)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Owner of the subscriber set.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<dyn EventSink>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. Every broadcast started after this returns reaches it.
    pub fn add(&self, sink: Arc<dyn EventSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, sink);
        tracing::debug!(subscriber_id = %id, subscribers = self.subscribers.len(), "Subscriber added");
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = %id, subscribers = self.subscribers.len(), "Subscriber removed");
        }
        removed
    }

    /// Current members, detached from the live set.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        let mut members: Vec<Subscriber> = self
            .subscribers
            .iter()
            .map(|entry| Subscriber {
                id: *entry.key(),
                sink: entry.value().clone(),
            })
            .collect();
        // Shard order is arbitrary; deliver in connection order.
        members.sort_by_key(|s| s.id);
        members
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Drop every sink so open streams terminate.
    pub fn clear(&self) {
        let count = self.subscribers.len();
        self.subscribers.clear();
        tracing::debug!(subscribers = count, "Subscriber registry cleared");
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
