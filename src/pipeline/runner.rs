//! Executes the stage list for one request.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::broadcast::{BroadcastMessage, Broadcaster, StageStatus};
use crate::observability::metrics;
use crate::pipeline::stage::{Stage, StageError, StageWork};
use crate::trace::{SpanStatus, TraceScope, Tracer};

const ROOT_SPAN: &str = "process-data";

/// Input of one pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub payload: Value,
    /// Scope the root span is parented to (root, or a continued remote trace).
    pub scope: TraceScope,
}

impl ProcessRequest {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            scope: TraceScope::root(),
        }
    }

    pub fn with_scope(mut self, scope: TraceScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// The `posts` field of the input, if present.
    pub processed: Option<Value>,
}

/// Failure surfaced at the run boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("pipeline run aborted: {0}")]
    Aborted(String),
}

/// Runs the fixed stage list, broadcasting progress as it goes.
pub struct PipelineRunner {
    stages: Vec<Stage>,
    work: Arc<dyn StageWork>,
    broadcaster: Broadcaster,
    tracer: Tracer,
}

impl PipelineRunner {
    pub fn new(
        stages: Vec<Stage>,
        work: Arc<dyn StageWork>,
        broadcaster: Broadcaster,
        tracer: Tracer,
    ) -> Self {
        Self {
            stages,
            work,
            broadcaster,
            tracer,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run every stage in order.
    ///
    /// The root span is ended on every exit path, and exactly one terminal
    /// message (`done` or `error`) is broadcast.
    pub async fn run(&self, request: ProcessRequest) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut root = self.tracer.start_span(ROOT_SPAN, &request.scope);
        let scope = root.scope();

        tracing::info!(
            run_id = %run_id,
            trace_id = %scope.active().map(|c| c.trace_id.to_string()).unwrap_or_default(),
            stages = self.stages.len(),
            "Pipeline run started"
        );

        let result = self.run_stages(run_id, &scope, &request.payload).await;

        let outcome = match result {
            Ok(()) => {
                let processed = request.payload.get("posts").cloned();
                root.add_event_with(
                    "processing completed",
                    [
                        ("processedData", processed.clone().unwrap_or(Value::Null)),
                        ("status", json!("success")),
                    ],
                );
                root.set_status(SpanStatus::Ok);
                self.broadcaster
                    .broadcast(&scope, &BroadcastMessage::done(run_id, processed.clone()));

                tracing::info!(run_id = %run_id, elapsed_ms = started.elapsed().as_millis() as u64, "Pipeline run succeeded");
                metrics::record_run("succeeded", started);
                Ok(RunOutcome { run_id, processed })
            }
            Err(e) => {
                root.set_status(SpanStatus::Error {
                    message: format!("Processing failed: {e}"),
                });
                self.broadcaster
                    .broadcast(&scope, &BroadcastMessage::error(run_id));

                tracing::error!(run_id = %run_id, error = %e, "Pipeline run failed");
                metrics::record_run("failed", started);
                Err(e)
            }
        };

        root.end();
        outcome
    }

    async fn run_stages(&self, run_id: Uuid, scope: &TraceScope, payload: &Value) -> Result<(), PipelineError> {
        for stage in &self.stages {
            self.run_stage(run_id, stage, scope, payload)
                .await
                .map_err(|source| PipelineError::StageFailed {
                    stage: stage.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        run_id: Uuid,
        stage: &Stage,
        scope: &TraceScope,
        payload: &Value,
    ) -> Result<(), StageError> {
        let started = Instant::now();
        let mut span = self.tracer.start_span(stage.name.clone(), scope);
        let stage_scope = span.scope();

        span.add_event(format!("{} started", stage.name));
        self.broadcaster.broadcast(
            &stage_scope,
            &BroadcastMessage::stage(run_id, &stage.name, StageStatus::Started),
        );
        tracing::debug!(run_id = %run_id, stage = %stage.name, "Stage started");

        // A panicking stage fails the run like any other stage error.
        let performed = AssertUnwindSafe(self.work.perform(stage, payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::new(format!("stage panicked: {}", panic_message(&*panic)))));

        if let Err(e) = performed {
            span.add_event_with(format!("{} failed", stage.name), [("reason", json!(e.reason()))]);
            span.set_status(SpanStatus::Error {
                message: e.to_string(),
            });
            span.end();
            tracing::warn!(run_id = %run_id, stage = %stage.name, error = %e, "Stage failed");
            return Err(e);
        }

        span.add_event(format!("{} completed", stage.name));
        self.broadcaster.broadcast(
            &stage_scope,
            &BroadcastMessage::stage(run_id, &stage.name, StageStatus::Completed),
        );
        span.set_status(SpanStatus::Ok);
        span.end();

        metrics::record_stage(&stage.name, started);
        tracing::debug!(run_id = %run_id, stage = %stage.name, "Stage completed");
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use futures_util::future::BoxFuture;

    use crate::broadcast::{EventSink, SinkError, SubscriberRegistry};
    use crate::trace::{InMemoryExporter, SpanData};

    /// Sink that records every payload it receives.
    #[derive(Default)]
    struct RecordingSink {
        received: std::sync::Mutex<Vec<BroadcastMessage>>,
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<BroadcastMessage> {
            self.received.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn send(&self, payload: &Arc<str>) -> Result<(), SinkError> {
            let message = serde_json::from_str(payload).unwrap();
            self.received.lock().unwrap().push(message);
            Ok(())
        }
    }

    /// Fails the named stage, sleeps briefly otherwise.
    struct FailAt(&'static str);

    impl StageWork for FailAt {
        fn perform<'a>(&'a self, stage: &'a Stage, _input: &'a Value) -> BoxFuture<'a, Result<(), StageError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if stage.name == self.0 {
                    Err(StageError::new("disk full"))
                } else {
                    Ok(())
                }
            })
        }
    }

    /// Panics inside the named stage.
    struct PanicAt(&'static str);

    impl StageWork for PanicAt {
        fn perform<'a>(&'a self, stage: &'a Stage, _input: &'a Value) -> BoxFuture<'a, Result<(), StageError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if stage.name == self.0 {
                    panic!("index out of bounds");
                }
                Ok(())
            })
        }
    }

    struct Harness {
        runner: Arc<PipelineRunner>,
        sink: Arc<RecordingSink>,
        exporter: Arc<InMemoryExporter>,
    }

    fn harness(work: Arc<dyn StageWork>) -> Harness {
        let exporter = Arc::new(InMemoryExporter::new());
        let tracer = Tracer::new("test", exporter.clone());
        let registry = Arc::new(SubscriberRegistry::new());
        let sink = Arc::new(RecordingSink::default());
        registry.add(sink.clone());

        let stages = vec![
            Stage::new("validate-input", Duration::from_millis(5)),
            Stage::new("process-data", Duration::from_millis(10)),
            Stage::new("store-results", Duration::from_millis(5)),
        ];
        let broadcaster = Broadcaster::new(registry, tracer.clone());
        Harness {
            runner: Arc::new(PipelineRunner::new(stages, work, broadcaster, tracer)),
            sink,
            exporter,
        }
    }

    fn describe(message: &BroadcastMessage) -> String {
        match message {
            BroadcastMessage::Stage { step, status, .. } => format!("{}:{}", status.as_str(), step),
            BroadcastMessage::Terminal { kind, .. } => format!("{kind:?}").to_lowercase(),
        }
    }

    fn assert_all_closed(spans: &[SpanData]) {
        for span in spans {
            assert!(span.end_time_unix_nano.is_some(), "span {} not ended", span.name);
        }
    }

    #[tokio::test]
    async fn test_success_broadcast_order() {
        let h = harness(Arc::new(crate::pipeline::SimulatedWork));
        let outcome = h
            .runner
            .run(ProcessRequest::new(json!({"posts": [1, 2, 3]})))
            .await
            .unwrap();

        assert_eq!(outcome.processed, Some(json!([1, 2, 3])));
        let order: Vec<_> = h.sink.messages().iter().map(describe).collect();
        assert_eq!(
            order,
            [
                "started:validate-input",
                "completed:validate-input",
                "started:process-data",
                "completed:process-data",
                "started:store-results",
                "completed:store-results",
                "done",
            ]
        );
        assert!(h.sink.messages().iter().all(|m| m.run_id() == Some(outcome.run_id)));
    }

    #[tokio::test]
    async fn test_success_span_tree() {
        let h = harness(Arc::new(crate::pipeline::SimulatedWork));
        h.runner
            .run(ProcessRequest::new(json!({"posts": ["a"]})))
            .await
            .unwrap();

        let spans = h.exporter.finished_spans();
        assert_all_closed(&spans);
        // root + 3 stages + 7 broadcasts
        assert_eq!(spans.len(), 11);

        let root = spans.iter().find(|s| s.name == ROOT_SPAN && s.parent_span_id.is_none()).unwrap();
        assert_eq!(root.status, SpanStatus::Ok);
        let completed = root.event("processing completed").unwrap();
        assert_eq!(completed.attributes["processedData"], json!(["a"]));
        assert_eq!(completed.attributes["status"], "success");

        let stage_ids: Vec<_> = spans
            .iter()
            .filter(|s| s.name != "sse-broadcast" && s.parent_span_id == Some(root.span_id))
            .map(|s| s.span_id)
            .collect();
        assert_eq!(stage_ids.len(), 3);

        for span in spans.iter().filter(|s| s.name == "sse-broadcast") {
            let parent = span.parent_span_id.unwrap();
            assert!(parent == root.span_id || stage_ids.contains(&parent));
            assert_eq!(span.trace_id, root.trace_id);
        }
    }

    #[tokio::test]
    async fn test_stage_failure_stops_pipeline() {
        let h = harness(Arc::new(FailAt("process-data")));
        let err = h
            .runner
            .run(ProcessRequest::new(json!({"posts": []})))
            .await
            .unwrap_err();

        assert!(matches!(&err, PipelineError::StageFailed { stage, .. } if stage == "process-data"));

        let order: Vec<_> = h.sink.messages().iter().map(describe).collect();
        assert_eq!(
            order,
            [
                "started:validate-input",
                "completed:validate-input",
                "started:process-data",
                "error",
            ]
        );
        match h.sink.messages().last().unwrap() {
            BroadcastMessage::Terminal { message, .. } => assert_eq!(message, "Processing failed"),
            other => panic!("unexpected terminal message {other:?}"),
        }

        let spans = h.exporter.finished_spans();
        assert_all_closed(&spans);
        let root = spans.iter().find(|s| s.name == ROOT_SPAN && s.parent_span_id.is_none()).unwrap();
        assert!(matches!(&root.status, SpanStatus::Error { message } if message.contains("process-data")));
        assert!(spans.iter().all(|s| s.name != "store-results"));
    }

    #[tokio::test]
    async fn test_stage_panic_is_a_stage_failure() {
        let h = harness(Arc::new(PanicAt("process-data")));
        let runner = h.runner.clone();
        let joined = tokio::spawn(async move { runner.run(ProcessRequest::new(json!({"posts": [1]}))).await }).await;

        let err = joined.expect("panic must not escape the run").unwrap_err();
        match &err {
            PipelineError::StageFailed { stage, source } => {
                assert_eq!(stage, "process-data");
                assert!(source.reason().contains("index out of bounds"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let order: Vec<_> = h.sink.messages().iter().map(describe).collect();
        assert_eq!(
            order,
            [
                "started:validate-input",
                "completed:validate-input",
                "started:process-data",
                "error",
            ]
        );

        let spans = h.exporter.finished_spans();
        assert_all_closed(&spans);
        let root = spans.iter().find(|s| s.name == ROOT_SPAN && s.parent_span_id.is_none()).unwrap();
        assert!(matches!(&root.status, SpanStatus::Error { message } if message.contains("panicked")));
        let stage = spans
            .iter()
            .find(|s| s.name == "process-data" && s.parent_span_id == Some(root.span_id))
            .unwrap();
        assert!(stage.event("process-data failed").is_some());
    }

    #[tokio::test]
    async fn test_stages_are_exposed_in_order() {
        let h = harness(Arc::new(crate::pipeline::SimulatedWork));
        let names: Vec<_> = h.runner.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["validate-input", "process-data", "store-results"]);
    }

    #[tokio::test]
    async fn test_concurrent_runs_keep_their_own_order_and_parents() {
        let h = harness(Arc::new(crate::pipeline::SimulatedWork));
        let (a, b) = tokio::join!(
            h.runner.run(ProcessRequest::new(json!({"posts": "a"}))),
            h.runner.run(ProcessRequest::new(json!({"posts": "b"}))),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.run_id, b.run_id);

        let mut per_run: HashMap<Uuid, Vec<String>> = HashMap::new();
        for message in h.sink.messages() {
            per_run
                .entry(message.run_id().unwrap())
                .or_default()
                .push(describe(&message));
        }
        let expected = [
            "started:validate-input",
            "completed:validate-input",
            "started:process-data",
            "completed:process-data",
            "started:store-results",
            "completed:store-results",
            "done",
        ];
        assert_eq!(per_run[&a.run_id], expected);
        assert_eq!(per_run[&b.run_id], expected);

        // Every non-root span lives in the same trace as its parent.
        let spans = h.exporter.finished_spans();
        assert_all_closed(&spans);
        let by_id: HashMap<_, _> = spans.iter().map(|s| (s.span_id, s)).collect();
        let roots: Vec<_> = spans.iter().filter(|s| s.parent_span_id.is_none()).collect();
        assert_eq!(roots.len(), 2);
        for span in &spans {
            if let Some(parent) = span.parent_span_id {
                assert_eq!(by_id[&parent].trace_id, span.trace_id, "span {} crossed runs", span.name);
            }
        }
    }

    #[tokio::test]
    async fn test_missing_posts_processes_to_none() {
        let h = harness(Arc::new(crate::pipeline::SimulatedWork));
        let outcome = h.runner.run(ProcessRequest::new(json!({}))).await.unwrap();
        assert!(outcome.processed.is_none());
    }
}
