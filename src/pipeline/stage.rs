//! Pipeline stages and the work they perform.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::config::StageConfig;

/// One named step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub simulated_duration: Duration,
}

impl Stage {
    pub fn new(name: impl Into<String>, simulated_duration: Duration) -> Self {
        Self {
            name: name.into(),
            simulated_duration,
        }
    }

    /// The stages every deployment starts with.
    pub fn default_pipeline() -> Vec<Stage> {
        vec![
            Stage::new("validate-input", Duration::from_millis(1000)),
            Stage::new("process-data", Duration::from_millis(2000)),
            Stage::new("store-results", Duration::from_millis(1500)),
        ]
    }
}

impl From<&StageConfig> for Stage {
    fn from(config: &StageConfig) -> Self {
        Stage::new(config.name.clone(), Duration::from_millis(config.duration_ms))
    }
}

/// Failure raised while performing a stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct StageError(String);

impl StageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// The unit of work behind every stage.
pub trait StageWork: Send + Sync {
    fn perform<'a>(&'a self, stage: &'a Stage, input: &'a Value) -> BoxFuture<'a, Result<(), StageError>>;
}

/// Waits out the stage's duration without blocking the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedWork;

impl StageWork for SimulatedWork {
    fn perform<'a>(&'a self, stage: &'a Stage, _input: &'a Value) -> BoxFuture<'a, Result<(), StageError>> {
        Box::pin(async move {
            tokio::time::sleep(stage.simulated_duration).await;
            Ok(())
        })
    }
}
