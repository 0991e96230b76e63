//! CLI channel — stdin/stdout REPL for local testing.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::ChannelError;
use crate::pipeline::{ExpensePipeline, ExpenseRequest, Identity};

use super::render_text;

/// CLI settings.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Identity every CLI line is submitted as.
    pub identity: Identity,
}

impl CliConfig {
    /// The internal user id defaults to the external id.
    pub fn new(external_id: &str, internal_user_id: Option<&str>) -> Option<Self> {
        let external = external_id.trim();
        if external.is_empty() {
            return None;
        }
        let internal = internal_user_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(external);
        Some(Self {
            identity: Identity::new(external, internal),
        })
    }

    /// From `EXPENSE_CLI_EXTERNAL_ID` and `EXPENSE_CLI_USER_ID`. `None` when
    /// the external id is not set.
    pub fn from_env() -> Option<Self> {
        let external = std::env::var("EXPENSE_CLI_EXTERNAL_ID").ok()?;
        let internal = std::env::var("EXPENSE_CLI_USER_ID").ok();
        Self::new(&external, internal.as_deref())
    }
}

/// Reads one expense per line and prints the outcome.
pub struct CliChannel {
    identity: Identity,
    pipeline: Arc<ExpensePipeline>,
}

impl CliChannel {
    pub fn new(config: CliConfig, pipeline: Arc<ExpensePipeline>) -> Self {
        Self {
            identity: config.identity,
            pipeline,
        }
    }

    /// Run against the process's stdin and stdout until EOF or `/quit`.
    pub async fn run(&self) -> Result<(), ChannelError> {
        let reader = BufReader::new(tokio::io::stdin());
        self.run_with(reader, tokio::io::stdout()).await
    }

    /// Run against arbitrary reader and writer.
    pub async fn run_with<R, W>(&self, reader: R, mut writer: W) -> Result<(), ChannelError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    return Err(ChannelError::InvalidMessage(e.to_string()));
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/quit" {
                break;
            }

            let request = ExpenseRequest {
                channel: "cli".to_string(),
                identity: Some(self.identity.clone()),
                text: Some(line.to_string()),
            };
            let outcome = self.pipeline.process(request).await;

            let output = format!("{}\n", render_text(&outcome));
            writer
                .write_all(output.as_bytes())
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "cli".into(),
                    reason: e.to_string(),
                })?;
        }

        writer.flush().await.map_err(|e| ChannelError::SendFailed {
            name: "cli".into(),
            reason: e.to_string(),
        })
    }
}
