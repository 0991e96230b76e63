//! Integration tests for the HTTP expense endpoint against a fake Supabase.
//!
//! Each test spins up a fake PostgREST server and the expense router on
//! random ports, then drives `/process-message` with reqwest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;

use expense_intake::app;
use expense_intake::config::StoreBackend;
use expense_intake::error::LlmError;
use expense_intake::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use expense_intake::pipeline::PipelineConfig;
use expense_intake::store::SupabaseConfig;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const API_KEY: &str = "service-key";

/// Stub LLM provider keyed on words in the user message (no real API calls).
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let text = request
            .messages
            .last()
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        let content = if text.contains("lunch") {
            r#"Sure! {"valid": true, "description": "Lunch", "amount": 15, "category": "Food"}"#
        } else if text.contains("doctor") {
            r#"{"valid": true, "description": "Doctor visit", "amount": "80.5", "category": "Medical/Healthcare"}"#
        } else if text.contains("bought") {
            r#"{"valid": true, "description": "Something", "amount": null, "category": "Gadgets"}"#
        } else if text.contains("spent") {
            r#"{"valid": false, "type": "ambiguous"}"#
        } else if text.contains("garbled") {
            "I cannot answer that"
        } else {
            r#"{"valid": false}"#
        };

        Ok(CompletionResponse {
            content: content.to_string(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

// ── Fake PostgREST ──────────────────────────────────────────────────

#[derive(Clone)]
struct FakeSupabase {
    whitelist: Vec<String>,
    insert_status: StatusCode,
    inserted: Arc<Mutex<Vec<Value>>>,
}

async fn users(
    State(fake): State<FakeSupabase>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad key"})));
    }
    let id = params
        .get("telegram_id")
        .and_then(|f| f.strip_prefix("eq."))
        .unwrap_or_default();
    let rows: Vec<Value> = fake
        .whitelist
        .iter()
        .filter(|w| w.as_str() == id)
        .map(|w| json!({"id": "u-1", "telegram_id": w}))
        .collect();
    (StatusCode::OK, Json(Value::Array(rows)))
}

async fn expenses(
    State(fake): State<FakeSupabase>,
    headers: HeaderMap,
    Json(row): Json<Value>,
) -> StatusCode {
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
    if bearer != Some(format!("Bearer {API_KEY}").as_str()) {
        return StatusCode::UNAUTHORIZED;
    }
    if fake.insert_status == StatusCode::CREATED {
        fake.inserted.lock().await.push(row);
    }
    fake.insert_status
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// Start the fake Supabase and the expense server; return (port, inserted rows).
async fn start_server(
    whitelist: &[&str],
    insert_status: StatusCode,
) -> (u16, Arc<Mutex<Vec<Value>>>) {
    let inserted = Arc::new(Mutex::new(Vec::new()));
    let fake = FakeSupabase {
        whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
        insert_status,
        inserted: Arc::clone(&inserted),
    };
    let supabase = Router::new()
        .route("/rest/v1/users", get(users))
        .route("/rest/v1/expenses", post(expenses))
        .with_state(fake);
    let supabase_port = serve(supabase).await;

    let backend = StoreBackend::Supabase(SupabaseConfig::new(
        format!("http://127.0.0.1:{supabase_port}/"),
        API_KEY,
    ));
    let pipeline = app::build_pipeline(&backend, Arc::new(StubLlm), &PipelineConfig::default());
    let port = serve(app::router(pipeline, None)).await;

    // Give the servers a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, inserted)
}

async fn post_message(port: u16, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process-message"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn message(text: &str) -> Value {
    json!({"userId": "u-1", "telegramId": "12345", "text": text})
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (port, _) = start_server(&[], StatusCode::CREATED).await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "expense-intake");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn valid_expense_is_saved() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::CREATED).await;

        let (status, body) = post_message(port, message("Lunch 15 dollars")).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Food expense added ✅");
        assert_eq!(body["expense"]["category"], "Food");

        let rows = inserted.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["user_id"], "u-1");
        assert_eq!(rows[0]["description"], "Lunch");
        assert_eq!(rows[0]["amount"], 15.0);
        assert_eq!(rows[0]["category"], "Food");
        assert!(rows[0]["added_at"].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn string_amount_and_slash_category_survive() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::CREATED).await;

        let (status, body) = post_message(port, message("doctor appointment 80.50")).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Medical/Healthcare expense added ✅");

        let rows = inserted.lock().await;
        assert_eq!(rows[0]["amount"], 80.5);
        assert_eq!(rows[0]["category"], "Medical/Healthcare");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_category_falls_back_to_other() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::CREATED).await;

        let (status, body) = post_message(port, message("bought a thing")).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Other expense added ✅");

        let rows = inserted.lock().await;
        assert_eq!(rows[0]["category"], "Other");
        assert!(rows[0]["amount"].is_null());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_fields_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::CREATED).await;

        let (status, body) =
            post_message(port, json!({"userId": "u-1", "text": "Lunch 15"})).await;
        assert_eq!(status, 400);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Missing required fields");

        let (status, _) = post_message(port, message("   ")).await;
        assert_eq!(status, 400);
        assert!(inserted.lock().await.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_body_is_missing_fields() {
    timeout(TEST_TIMEOUT, async {
        let (port, _) = start_server(&["12345"], StatusCode::CREATED).await;

        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/process-message"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Missing required fields");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unlisted_user_forbidden() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["99999"], StatusCode::CREATED).await;

        let (status, body) = post_message(port, message("Lunch 15 dollars")).await;
        assert_eq!(status, 403);
        assert_eq!(body["message"], "User not whitelisted");
        assert!(inserted.lock().await.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn irrelevant_and_ambiguous_messages() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::CREATED).await;

        let (status, body) = post_message(port, message("hello there")).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "This message is not related to expenses.");

        let (status, body) = post_message(port, message("I spent some money")).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "Please provide more details about your expense.");

        let (status, body) = post_message(port, message("garbled")).await;
        assert_eq!(status, 400);
        assert_eq!(body["message"], "This message is not related to expenses.");

        assert!(inserted.lock().await.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn store_refusal_is_server_error() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::OK).await;

        let (status, body) = post_message(port, message("Lunch 15 dollars")).await;
        assert_eq!(status, 500);
        assert_eq!(body["message"], "Failed to save expense");
        assert!(inserted.lock().await.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn numeric_telegram_id_accepted_on_api_alias() {
    timeout(TEST_TIMEOUT, async {
        let (port, inserted) = start_server(&["12345"], StatusCode::CREATED).await;

        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/api/expenses"))
            .json(&json!({"userId": "u-1", "telegramId": 12345, "text": "Lunch 15"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(inserted.lock().await.len(), 1);
    })
    .await
    .expect("test timed out");
}
