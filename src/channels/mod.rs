//! Transports that feed the expense pipeline.
//!
//! Each channel turns its own inbound shape into an `ExpenseRequest` and
//! renders the resulting `PipelineOutcome` back in its own format.

pub mod cli;
pub mod http;
pub mod telegram;

pub use cli::{CliChannel, CliConfig};
pub use http::{expense_routes, render_outcome};
pub use telegram::{TelegramChannel, TelegramConfig};

use crate::pipeline::PipelineOutcome;

/// Plain-text rendering shared by the chat-style channels.
pub fn render_text(outcome: &PipelineOutcome) -> String {
    match outcome {
        PipelineOutcome::Accepted { record } => {
            let amount = record
                .amount
                .map(|a| a.normalize().to_string())
                .unwrap_or_else(|| "no amount".to_string());
            format!("{}\n{}: {}", outcome.message(), record.description, amount)
        }
        _ => outcome.message(),
    }
}
