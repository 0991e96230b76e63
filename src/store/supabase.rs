//! Supabase (PostgREST) backend for the user directory and expense store.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::{ConfigError, StoreError};
use crate::pipeline::types::ExpenseRecord;
use crate::store::traits::{ExpenseStore, UserDirectory};

/// Connection settings for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub api_key: SecretString,
    /// Table holding whitelisted users, keyed by `telegram_id`.
    pub users_table: String,
    pub expenses_table: String,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.into()),
            users_table: "users".to_string(),
            expenses_table: "expenses".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SUPABASE_URL".to_string()))?;
        let api_key = std::env::var("SUPABASE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("SUPABASE_API_KEY".to_string()))?;

        let mut config = Self::new(url, api_key);
        if let Ok(table) = std::env::var("EXPENSE_USERS_TABLE") {
            config.users_table = table;
        }
        if let Ok(table) = std::env::var("EXPENSE_EXPENSES_TABLE") {
            config.expenses_table = table;
        }
        Ok(config)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }
}

/// PostgREST client implementing both persistence seams.
pub struct SupabaseStore {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.config.api_key.expose_secret();
        builder
            .header("apikey", key)
            .header("Authorization", format!("Bearer {key}"))
    }
}

#[async_trait]
impl UserDirectory for SupabaseStore {
    async fn is_whitelisted(&self, external_id: &str) -> Result<bool, StoreError> {
        let table = &self.config.users_table;
        let resp = self
            .request(self.client.get(self.config.table_url(table)))
            .query(&[("telegram_id", format!("eq.{external_id}"))])
            .send()
            .await
            .map_err(|e| StoreError::Request {
                table: table.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus {
                table: table.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<serde_json::Value> =
            resp.json().await.map_err(|e| StoreError::MalformedResponse {
                table: table.clone(),
                reason: e.to_string(),
            })?;

        debug!(external_id, matches = rows.len(), "User directory lookup");
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl ExpenseStore for SupabaseStore {
    async fn insert_expense(&self, record: &ExpenseRecord) -> Result<(), StoreError> {
        let table = &self.config.expenses_table;
        let resp = self
            .request(self.client.post(self.config.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Request {
                table: table.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status != reqwest::StatusCode::CREATED {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Expense insert not acknowledged");
            return Err(StoreError::UnexpectedStatus {
                table: table.clone(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
