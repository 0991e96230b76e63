//! Configuration types.

use std::collections::HashSet;

use crate::channels::{CliConfig, TelegramConfig};
use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::pipeline::PipelineConfig;
use crate::store::SupabaseConfig;

/// Where users and expenses live.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Supabase(SupabaseConfig),
    /// In-process dry run. Nothing leaves the process.
    Memory { whitelist: HashSet<String> },
}

impl StoreBackend {
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = std::env::var("EXPENSE_STORE").unwrap_or_else(|_| "supabase".to_string());

        match kind.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(Self::Supabase(SupabaseConfig::from_env()?)),
            "memory" => {
                let whitelist = std::env::var("EXPENSE_MEMORY_WHITELIST")
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Ok(Self::Memory { whitelist })
            }
            other => Err(ConfigError::InvalidValue {
                key: "EXPENSE_STORE".to_string(),
                message: format!("expected 'supabase' or 'memory', got '{other}'"),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Supabase(_) => "supabase",
            Self::Memory { .. } => "memory",
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("EXPENSE_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::default().port);
        Self { port }
    }
}

/// Everything the service needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub telegram: Option<TelegramConfig>,
    pub cli: Option<CliConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store: StoreBackend::from_env()?,
            llm: LlmConfig::from_env()?,
            pipeline: PipelineConfig::from_env(),
            server: ServerConfig::from_env(),
            telegram: TelegramConfig::from_env(),
            cli: CliConfig::from_env(),
        })
    }
}
