//! Traced fan-out of one message to every subscriber.

use std::sync::Arc;

use serde_json::json;

use crate::broadcast::message::BroadcastMessage;
use crate::broadcast::registry::SubscriberRegistry;
use crate::observability::metrics;
use crate::trace::{SpanStatus, TraceScope, Tracer};

const BROADCAST_SPAN: &str = "sse-broadcast";

/// Serializes messages and writes them to a snapshot of the registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    tracer: Tracer,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, tracer: Tracer) -> Self {
        Self { registry, tracer }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Deliver `message` to every current subscriber.
    ///
    /// Fire-and-forget: a broken subscriber is removed and skipped, the rest
    /// still receive the message.
    pub fn broadcast(&self, scope: &TraceScope, message: &BroadcastMessage) {
        let mut span = self.tracer.start_span(BROADCAST_SPAN, scope);

        let payload: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize broadcast message");
                span.set_status(SpanStatus::Error {
                    message: format!("serialization failed: {e}"),
                });
                span.end();
                return;
            }
        };

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for subscriber in self.registry.snapshot() {
            match subscriber.send(&payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::debug!(
                        subscriber_id = %subscriber.id(),
                        error = %e,
                        "Subscriber write failed, removing it"
                    );
                    self.registry.remove(subscriber.id());
                }
            }
        }

        span.add_event_with(
            "sse message sent",
            [
                ("step", json!(message.step().unwrap_or("none"))),
                (
                    "status",
                    json!(message.status().map(|s| s.as_str()).unwrap_or("none")),
                ),
                ("delivered", json!(delivered)),
                ("failed", json!(failed)),
            ],
        );
        span.end();

        metrics::record_broadcast(delivered, failed);
        if failed > 0 {
            metrics::set_active_subscribers(self.registry.len());
        }
        tracing::trace!(delivered, failed, payload = %payload, "Broadcast sent");
    }
}
