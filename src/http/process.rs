//! `POST /process`: run the pipeline for one JSON body.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::propagation::scope_from_headers;
use crate::http::server::AppState;
use crate::pipeline::{PipelineError, ProcessRequest};

/// Body of a successful `/process` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_data: Option<Value>,
}

/// Run the pipeline and answer once it finishes.
///
/// The run executes on its own task: if the caller hangs up, the run still
/// completes and still broadcasts its terminal message.
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<ProcessResponse>, PipelineError> {
    tracing::info!(body = %body, stages = state.runner.stages().len(), "Processing data");

    let request = ProcessRequest::new(body).with_scope(scope_from_headers(&headers));
    let runner = state.runner.clone();
    let outcome = match tokio::spawn(async move { runner.run(request).await }).await {
        Ok(result) => result?,
        Err(e) => {
            tracing::error!(error = %e, "Pipeline task aborted");
            return Err(PipelineError::Aborted(e.to_string()));
        }
    };

    Ok(Json(ProcessResponse {
        message: "Data processed successfully".to_string(),
        processed_data: outcome.processed,
    }))
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        // The cause stays in logs and the root span.
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
