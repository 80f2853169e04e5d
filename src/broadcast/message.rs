//! Wire shape of stream notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Progress of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Started,
    Completed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
        }
    }
}

/// Outcome carried by a terminal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    Done,
    Error,
}

/// A message pushed to every subscriber.
///
/// Serialized as a flat JSON object; exactly one of the two shapes is ever
/// populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BroadcastMessage {
    /// `{"step": "...", "status": "started" | "completed"}`
    #[serde(rename_all = "camelCase")]
    Stage {
        step: String,
        status: StageStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<Uuid>,
    },
    /// `{"type": "done" | "error", "message": "..."}`
    #[serde(rename_all = "camelCase")]
    Terminal {
        #[serde(rename = "type")]
        kind: TerminalKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<Uuid>,
    },
}

impl BroadcastMessage {
    pub fn stage(run_id: Uuid, step: impl Into<String>, status: StageStatus) -> Self {
        Self::Stage {
            step: step.into(),
            status,
            run_id: Some(run_id),
        }
    }

    pub fn done(run_id: Uuid, payload: Option<Value>) -> Self {
        Self::Terminal {
            kind: TerminalKind::Done,
            message: "Processing complete".to_string(),
            payload,
            run_id: Some(run_id),
        }
    }

    pub fn error(run_id: Uuid) -> Self {
        Self::Terminal {
            kind: TerminalKind::Error,
            message: "Processing failed".to_string(),
            payload: None,
            run_id: Some(run_id),
        }
    }

    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Stage { step, .. } => Some(step.as_str()),
            Self::Terminal { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StageStatus> {
        match self {
            Self::Stage { status, .. } => Some(*status),
            Self::Terminal { .. } => None,
        }
    }

    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::Stage { run_id, .. } | Self::Terminal { run_id, .. } => *run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}
