//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (tracing, CORS, timeouts, body limit, request ID)
//! - Own the subscriber registry and pipeline runner shared by handlers
//! - Serve until shutdown, then close every open stream

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::broadcast::{Broadcaster, SubscriberRegistry};
use crate::config::ServiceConfig;
use crate::http::{health, process, stream};
use crate::pipeline::{PipelineRunner, SimulatedWork, Stage, StageWork};
use crate::trace::Tracer;

/// Errors that can occur while serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("serve error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SubscriberRegistry>,
    pub runner: Arc<PipelineRunner>,
    pub tracer: Tracer,
}

impl AppState {
    /// Wire registry, broadcaster and runner around one tracer.
    pub fn new(stages: Vec<Stage>, work: Arc<dyn StageWork>, tracer: Tracer) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), tracer.clone());
        let runner = Arc::new(PipelineRunner::new(stages, work, broadcaster, tracer.clone()));
        Self {
            registry,
            runner,
            tracer,
        }
    }
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    registry: Arc<SubscriberRegistry>,
}

impl HttpServer {
    /// Create a server running the configured stages as simulated work.
    pub fn new(config: ServiceConfig, tracer: Tracer) -> Self {
        Self::with_work(config, tracer, Arc::new(SimulatedWork))
    }

    /// Create a server whose stages perform `work`.
    pub fn with_work(config: ServiceConfig, tracer: Tracer, work: Arc<dyn StageWork>) -> Self {
        let stages = config.pipeline.stages.iter().map(Stage::from).collect();
        let state = AppState::new(stages, work, tracer);
        let registry = state.registry.clone();
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// `/process` responds when its run finishes and is exempt from the
    /// request timeout.
    #[allow(deprecated)]
    pub fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let timed: Router<AppState> = Router::new()
            .route("/stream", get(stream::subscribe))
            .route("/health", get(health::health))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route("/process", post(process::process))
            .merge(timed)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(CorsLayer::permissive())
    }

    /// A clone of the router, for driving the service in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Serve until `shutdown` fires, then close all subscriber streams and
    /// drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            stages = self.config.pipeline.stages.len(),
            "HTTP server starting"
        );

        let registry = self.registry.clone();
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!(
                    subscribers = registry.len(),
                    "Shutdown signal received, closing subscriber streams"
                );
                // Dropping every sink ends every SSE body, letting connections drain.
                registry.clear();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
