//! HTTP front end — `POST /process-message` and friends.
//!
//! Accepts the flat wire shape (`userId`, `telegramId`, `text`) as well as a
//! nested `identity` object, and renders every outcome as
//! `{status, message[, expense]}` with the matching status code.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::pipeline::{ExpensePipeline, ExpenseRequest, Identity, PipelineOutcome};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct HttpState {
    pub pipeline: Arc<ExpensePipeline>,
}

/// Build the HTTP routes for expense submission.
pub fn expense_routes(pipeline: Arc<ExpensePipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process-message", post(process_message))
        .route("/api/expenses", post(process_message))
        .with_state(HttpState { pipeline })
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "expense-intake"
    }))
}

// ── Request body ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessageBody {
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    telegram_id: Option<Value>,
    #[serde(default)]
    identity: Option<IdentityBody>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityBody {
    #[serde(default)]
    external: Option<Value>,
    #[serde(default)]
    internal: Option<Value>,
}

impl ProcessMessageBody {
    fn into_request(self) -> ExpenseRequest {
        let (external, internal) = match self.identity {
            Some(identity) => (identity.external, identity.internal),
            None => (self.telegram_id, self.user_id),
        };
        let external = external.as_ref().and_then(id_string);
        let internal = internal.as_ref().and_then(id_string);

        let identity = match (external, internal) {
            (None, None) => None,
            (external, internal) => Some(Identity::new(
                external.unwrap_or_default(),
                internal.unwrap_or_default(),
            )),
        };

        ExpenseRequest {
            channel: "http".to_string(),
            identity,
            text: self.text,
        }
    }
}

/// Ids arrive as strings or bare numbers (Telegram ids are integers).
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

async fn process_message(State(state): State<HttpState>, body: Bytes) -> impl IntoResponse {
    // Unparseable bodies are treated like empty ones: the pipeline rejects
    // them as missing fields without any external call.
    let parsed: ProcessMessageBody = serde_json::from_slice(&body).unwrap_or_else(|e| {
        debug!(error = %e, "Unparseable request body");
        ProcessMessageBody::default()
    });

    let outcome = state.pipeline.process(parsed.into_request()).await;
    render_outcome(&outcome)
}

/// Render an outcome as an HTTP status and JSON body.
pub fn render_outcome(outcome: &PipelineOutcome) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match outcome {
        PipelineOutcome::Accepted { record } => json!({
            "status": "success",
            "message": outcome.message(),
            "expense": record,
        }),
        _ => json!({
            "status": "error",
            "message": outcome.message(),
        }),
    };

    (status, Json(body))
}
