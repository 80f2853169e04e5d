//! End-to-end pipeline runs observed through `/stream`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use progress_relay::pipeline::SimulatedWork;
use progress_relay::trace::{InMemoryExporter, Tracer};

mod common;
use common::{fast_config, stage_transitions, start_server, start_server_with, SseReader};

fn expected_transitions() -> Vec<(String, String)> {
    ["validate-input", "process-data", "store-results"]
        .iter()
        .flat_map(|step| {
            [
                (step.to_string(), "started".to_string()),
                (step.to_string(), "completed".to_string()),
            ]
        })
        .collect()
}

#[tokio::test]
async fn test_run_broadcasts_every_transition_in_order() {
    let server = start_server(fast_config()).await;
    let mut reader = SseReader::connect(&server).await;

    let res = reqwest::Client::new()
        .post(server.url("/process"))
        .json(&json!({"posts": [1, 2, 3]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["processedData"], json!([1, 2, 3]));
    assert!(body["message"].is_string());

    let messages = reader.collect_run(None).await;
    assert_eq!(stage_transitions(&messages), expected_transitions());

    let terminal = messages.last().unwrap();
    assert_eq!(terminal["type"], "done");
    assert_eq!(terminal["payload"], json!([1, 2, 3]));

    // Every message of the run carries the same run id.
    let run_id = &terminal["runId"];
    assert!(run_id.is_string());
    assert!(messages.iter().all(|m| &m["runId"] == run_id));

    server.stop().await;
}

#[tokio::test]
async fn test_every_subscriber_sees_the_same_sequence() {
    let server = start_server(fast_config()).await;
    let mut first = SseReader::connect(&server).await;
    let mut second = SseReader::connect(&server).await;

    let health: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["subscribers"], 2);
    assert_eq!(health["status"], "operational");

    reqwest::Client::new()
        .post(server.url("/process"))
        .json(&json!({"posts": ["a"]}))
        .send()
        .await
        .unwrap();

    let a = first.collect_run(None).await;
    let b = second.collect_run(None).await;
    assert_eq!(a, b);
    assert_eq!(a.len(), 7);

    server.stop().await;
}

#[tokio::test]
async fn test_late_subscriber_gets_no_replay() {
    let server = start_server(fast_config()).await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/process"))
        .json(&json!({"posts": []}))
        .send()
        .await
        .unwrap();

    let mut reader = SseReader::connect(&server).await;
    client
        .post(server.url("/process"))
        .json(&json!({"posts": [9]}))
        .send()
        .await
        .unwrap();

    let messages = reader.collect_run(None).await;
    assert_eq!(messages[0]["step"], "validate-input");
    assert_eq!(messages[0]["status"], "started");
    assert_eq!(messages.last().unwrap()["payload"], json!([9]));

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_runs_keep_per_run_order() {
    let server = start_server(fast_config()).await;
    let mut reader = SseReader::connect(&server).await;
    let client = reqwest::Client::new();

    let post = |posts: Value| {
        let client = client.clone();
        let url = server.url("/process");
        async move {
            client
                .post(url)
                .json(&json!({ "posts": posts }))
                .send()
                .await
                .unwrap()
                .status()
        }
    };
    let (a, b) = tokio::join!(post(json!([1])), post(json!([2])));
    assert!(a.is_success());
    assert!(b.is_success());

    let mut by_run: HashMap<String, Vec<Value>> = HashMap::new();
    let mut terminals = 0;
    while terminals < 2 {
        let message = reader.next_message().await.expect("stream ended early");
        if message.get("type").is_some() {
            terminals += 1;
        }
        let run = message["runId"].as_str().unwrap().to_string();
        by_run.entry(run).or_default().push(message);
    }

    assert_eq!(by_run.len(), 2);
    for messages in by_run.values() {
        assert_eq!(stage_transitions(messages), expected_transitions());
        assert_eq!(messages.last().unwrap()["type"], "done");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_traceparent_continues_caller_trace() {
    let exporter = Arc::new(InMemoryExporter::new());
    let tracer = Tracer::new("progress-relay-test", exporter.clone());
    let server = start_server_with(fast_config(), tracer, Arc::new(SimulatedWork)).await;

    let trace_id = "4bf92f3577b34da6a3ce929d0e0e4736";
    let res = reqwest::Client::new()
        .post(server.url("/process"))
        .header(
            "traceparent",
            format!("00-{trace_id}-00f067aa0ba902b7-01"),
        )
        .json(&json!({"posts": [1]}))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let spans = exporter.finished_spans();
    let root = spans
        .iter()
        .find(|s| s.name == "process-data" && s.parent_span_id.map(|p| p.to_string()).as_deref() == Some("00f067aa0ba902b7"))
        .expect("root span continues the caller's trace");
    assert_eq!(root.trace_id.to_string(), trace_id);
    assert!(spans.iter().all(|s| s.trace_id.to_string() == trace_id));

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_open_streams() {
    let server = start_server(fast_config()).await;
    let mut reader = SseReader::connect(&server).await;

    server.shutdown.trigger();
    assert!(reader.next_message().await.is_none());
}

#[tokio::test]
async fn test_non_ascii_payload_reaches_subscribers_intact() {
    let server = start_server(fast_config()).await;
    let mut reader = SseReader::connect(&server).await;
    let posts = json!(["caf\u{e9} \u{2713}", "\u{65e5}\u{672c}\u{8a9e}".repeat(2000)]);

    let res = reqwest::Client::new()
        .post(server.url("/process"))
        .json(&json!({ "posts": posts.clone() }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let messages = reader.collect_run(None).await;
    assert_eq!(messages.last().unwrap()["payload"], posts);

    server.stop().await;
}
