//! Error types for Expense Intake.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the remote user directory or expense store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request to {table} failed: {reason}")]
    Request { table: String, reason: String },

    #[error("Unexpected status {status} from {table}: {body}")]
    UnexpectedStatus {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {table}: {reason}")]
    MalformedResponse { table: String, reason: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Classification failures that must not be read as a verdict.
///
/// Everything else the reasoning service can do wrong degrades to
/// `Irrelevant` inside the classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Reasoning service did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Why a reasoning-service payload could not be decoded into a verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("response is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("missing or non-boolean \"valid\" discriminator")]
    MissingDiscriminator,

    #[error("valid expense without a string \"{0}\" field")]
    MissingField(&'static str),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
