//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use progress_relay::config::{ServiceConfig, StageConfig};
use progress_relay::http::HttpServer;
use progress_relay::lifecycle::Shutdown;
use progress_relay::pipeline::{SimulatedWork, StageWork};
use progress_relay::trace::Tracer;

/// A relay serving on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .unwrap();
    }
}

/// The standard three stages, shortened so tests finish quickly.
pub fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.pipeline.stages = vec![
        StageConfig::new("validate-input", 20),
        StageConfig::new("process-data", 40),
        StageConfig::new("store-results", 30),
    ];
    config
}

pub async fn start_server(config: ServiceConfig) -> TestServer {
    start_server_with(config, Tracer::noop(), Arc::new(SimulatedWork)).await
}

pub async fn start_server_with(
    config: ServiceConfig,
    tracer: Tracer,
    work: Arc<dyn StageWork>,
) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = HttpServer::with_work(config, tracer, work);

    let handle = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

/// Minimal server-sent-events reader over a streaming response.
pub struct SseReader {
    res: reqwest::Response,
    buffer: Vec<u8>,
}

impl SseReader {
    /// Open `/stream`. Returns once the subscription is registered.
    pub async fn connect(server: &TestServer) -> Self {
        let res = reqwest::get(server.url("/stream")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "text/event-stream");
        Self {
            res,
            buffer: Vec::new(),
        }
    }

    /// Next `data:` payload, or `None` when the stream ends.
    pub async fn next_message(&mut self) -> Option<Value> {
        loop {
            if let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
                let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
                let data = std::str::from_utf8(&frame)
                    .expect("complete SSE frames are valid UTF-8")
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect::<Vec<_>>()
                    .join("\n");
                if data.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&data).unwrap());
            }

            let chunk = tokio::time::timeout(Duration::from_secs(5), self.res.chunk())
                .await
                .expect("timed out waiting for an event")
                .ok()??;
            self.buffer.extend_from_slice(&chunk);
        }
    }

    /// Read until a terminal message for `run_id` (or any run, if `None`).
    pub async fn collect_run(&mut self, run_id: Option<&str>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message().await {
            let terminal = message.get("type").is_some();
            let matches = run_id.map_or(true, |id| message["runId"] == id);
            messages.push(message);
            if terminal && matches {
                break;
            }
        }
        messages
    }
}

/// `(step, status)` pairs of the stage messages, in arrival order.
pub fn stage_transitions(messages: &[Value]) -> Vec<(String, String)> {
    messages
        .iter()
        .filter(|m| m.get("step").is_some())
        .map(|m| {
            (
                m["step"].as_str().unwrap().to_string(),
                m["status"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}
