//! Telegram channel — receives Bot API updates by webhook or long-polling.
//!
//! Each text message runs through the expense pipeline once and gets a
//! plain-text reply. The Telegram user id is used as both the whitelist key
//! and the expense owner.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::pipeline::{ExpensePipeline, ExpenseRequest, Identity};

use super::render_text;

/// Header Telegram sets on webhook calls when a secret token was registered.
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Long-poll timeout passed to `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

// ── Config ──────────────────────────────────────────────────────────

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls.
    pub webhook_secret: Option<String>,
    /// Poll `getUpdates` instead of waiting for webhook calls.
    pub polling: bool,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            webhook_secret: None,
            polling: false,
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// `None` when `TELEGRAM_BOT_TOKEN` is not set.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;

        let webhook_secret = std::env::var("TELEGRAM_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let polling = std::env::var("TELEGRAM_POLLING")
            .ok()
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Some(Self {
            webhook_secret,
            polling,
            ..Self::new(bot_token)
        })
    }
}

// ── Bot API types ───────────────────────────────────────────────────

/// The subset of a Bot API `Update` this channel reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

/// A reply to send to one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
}

// ── Channel ─────────────────────────────────────────────────────────

/// Telegram front end for the expense pipeline.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    pipeline: Arc<ExpensePipeline>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, pipeline: Arc<ExpensePipeline>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            pipeline,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.config.polling
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.config.api_base, self.config.bot_token)
    }

    /// Handle one update; `None` when there is nothing to answer.
    pub async fn handle_update(&self, update: &Update) -> Option<Reply> {
        let message = update.message.as_ref()?;
        let text = message.text.as_deref()?.trim();
        let user_id = message.from.as_ref().map(|u| u.id.to_string());
        let chat_id = message.chat.id;

        if let Some(command) = text.strip_prefix('/') {
            let command = command.split_whitespace().next().unwrap_or_default();
            // Commands may be addressed as /help@SomeBot.
            let command = command.split('@').next().unwrap_or_default();
            if matches!(command, "start" | "help") {
                return Some(Reply {
                    chat_id,
                    text: help_text(user_id.as_deref()),
                });
            }
        }

        debug!(
            update_id = update.update_id,
            username = message
                .from
                .as_ref()
                .and_then(|u| u.username.as_deref())
                .unwrap_or("unknown"),
            "Telegram message received"
        );

        let identity = user_id.map(|id| Identity::new(id.clone(), id));
        let request = ExpenseRequest {
            channel: "telegram".to_string(),
            identity,
            text: Some(text.to_string()),
        };

        let outcome = self.pipeline.process(request).await;
        Some(Reply {
            chat_id,
            text: render_text(&outcome),
        })
    }

    /// Send a plain-text message to a chat.
    pub async fn send_message(&self, reply: &Reply) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&json!({
                "chat_id": reply.chat_id,
                "text": reply.text,
            }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage returned {status}: {body}"),
            });
        }
        Ok(())
    }

    /// Verify the bot token with `getMe`.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Fetch the next batch of updates after `offset`.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"]
            }))
            .send()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("getUpdates failed: {e}")))?;

        let data: GetUpdatesResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("getUpdates parse error: {e}")))?;

        if !data.ok {
            return Err(ChannelError::InvalidMessage(
                "getUpdates returned ok=false".to_string(),
            ));
        }
        Ok(data.result)
    }

    /// Long-poll for updates until the task is dropped.
    pub async fn run_polling(self: Arc<Self>) {
        let mut offset: i64 = 0;
        info!("Telegram channel polling for messages...");

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(reply) = self.handle_update(&update).await else {
                    continue;
                };
                if let Err(e) = self.send_message(&reply).await {
                    warn!(chat_id = reply.chat_id, error = %e, "Failed to send Telegram reply");
                }
            }
        }
    }

    /// Build the webhook route. Replies are returned in the webhook response
    /// body as a `sendMessage` call, so no extra request is needed.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/telegram/webhook", post(webhook))
            .with_state(self)
    }
}

async fn webhook(
    State(channel): State<Arc<TelegramChannel>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Response {
    if let Some(expected) = &channel.config.webhook_secret {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!(update_id = update.update_id, "Webhook call with bad secret token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    match channel.handle_update(&update).await {
        Some(reply) => Json(json!({
            "method": "sendMessage",
            "chat_id": reply.chat_id,
            "text": reply.text,
        }))
        .into_response(),
        None => StatusCode::OK.into_response(),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn help_text(user_id: Option<&str>) -> String {
    let mut text = String::from(
        "Send me an expense like \"Lunch 15 dollars\" and I'll file it under the right category.",
    );
    if let Some(id) = user_id {
        text.push_str(&format!(
            "\nYour Telegram id is {id}. Ask the administrator to whitelist it if you are not registered yet."
        ));
    }
    text
}

// ── Tests ───────────────────────────────────────────────────────────
