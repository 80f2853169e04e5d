//! `GET /stream`: long-lived server-sent-events subscription.
//!
//! # Responsibilities
//! - Register a channel-backed sink with the subscriber registry
//! - Open an `sse-connection` span that lives as long as the connection
//! - Frame each broadcast payload as `data: <json>\n\n`
//! - Unregister and end the span when the client goes away
//!
//! # Design Decisions
//! - Disconnect is observed as the response body being dropped; no polling
//! - Messages broadcast before the subscription exists are never replayed

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
};
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::broadcast::{ChannelSink, SubscriberId, SubscriberRegistry};
use crate::http::propagation::scope_from_headers;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::trace::Span;

const CONNECTION_SPAN: &str = "sse-connection";

/// Subscribe the caller to every broadcast from now on.
pub async fn subscribe(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let mut span = state
        .tracer
        .start_span(CONNECTION_SPAN, &scope_from_headers(&headers));

    let (sink, rx) = ChannelSink::new();
    let id = state.registry.add(Arc::new(sink));
    span.add_event("client connected to sse");
    metrics::set_active_subscribers(state.registry.len());
    tracing::info!(subscriber_id = %id, subscribers = state.registry.len(), "SSE client connected");

    let stream = SubscriptionStream {
        rx,
        _guard: ConnectionGuard {
            id,
            registry: state.registry.clone(),
            span: Some(span),
        },
    };

    (
        [(header::CONNECTION, HeaderValue::from_static("keep-alive"))],
        Sse::new(stream),
    )
}

/// SSE body for one subscriber.
pub struct SubscriptionStream {
    rx: mpsc::UnboundedReceiver<Arc<str>>,
    _guard: ConnectionGuard,
}

impl Stream for SubscriptionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
            .map(|next| next.map(|payload| Ok(Event::default().data(&*payload))))
    }
}

/// Removes the subscriber and closes its connection span on drop.
struct ConnectionGuard {
    id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
    span: Option<Span>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        metrics::set_active_subscribers(self.registry.len());
        if let Some(mut span) = self.span.take() {
            span.add_event("client disconnected from sse");
            span.end();
        }
        tracing::info!(subscriber_id = %self.id, subscribers = self.registry.len(), "SSE client disconnected");
    }
}
