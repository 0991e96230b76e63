//! Service wiring — builds the pipeline and the HTTP router from config.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::channels::{CliChannel, TelegramChannel, expense_routes};
use crate::config::{AppConfig, StoreBackend};
use crate::error::{self, ChannelError};
use crate::llm::create_provider;
use crate::llm::provider::LlmProvider;
use crate::pipeline::{ExpensePipeline, PipelineConfig};
use crate::store::{ExpenseStore, MemoryStore, SupabaseStore, UserDirectory};

/// Open the configured store, returning it as both directory and sink.
pub fn open_store(backend: &StoreBackend) -> (Arc<dyn UserDirectory>, Arc<dyn ExpenseStore>) {
    match backend {
        StoreBackend::Supabase(config) => {
            let store = Arc::new(SupabaseStore::new(config.clone()));
            (store.clone(), store)
        }
        StoreBackend::Memory { whitelist } => {
            let store = Arc::new(MemoryStore::new(whitelist.iter().cloned()));
            (store.clone(), store)
        }
    }
}

/// Assemble the pipeline from its collaborators.
pub fn build_pipeline(
    backend: &StoreBackend,
    llm: Arc<dyn LlmProvider>,
    config: &PipelineConfig,
) -> Arc<ExpensePipeline> {
    let (directory, store) = open_store(backend);
    Arc::new(ExpensePipeline::new(directory, llm, store, config))
}

/// The full HTTP surface: expense routes plus the Telegram webhook when
/// a webhook-mode bot is configured.
pub fn router(pipeline: Arc<ExpensePipeline>, telegram: Option<Arc<TelegramChannel>>) -> Router {
    let mut app = expense_routes(pipeline);
    if let Some(channel) = telegram.filter(|c| !c.is_polling()) {
        app = app.merge(channel.router());
    }
    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start every configured channel and serve HTTP until the listener fails.
pub async fn run(config: AppConfig) -> error::Result<()> {
    eprintln!("💸 Expense Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Store: {}", config.store.name());
    eprintln!(
        "   HTTP: http://0.0.0.0:{}/process-message",
        config.server.port
    );

    let llm = create_provider(&config.llm)?;
    let pipeline = build_pipeline(&config.store, llm, &config.pipeline);

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = match config.telegram {
        Some(telegram_config) => {
            let channel = Arc::new(TelegramChannel::new(telegram_config, pipeline.clone()));
            if let Err(e) = channel.health_check().await {
                tracing::warn!(error = %e, "Telegram bot token check failed");
            }
            if channel.is_polling() {
                eprintln!("   Telegram: enabled (polling)");
                tokio::spawn(Arc::clone(&channel).run_polling());
            } else {
                eprintln!("   Telegram: enabled (webhook at /telegram/webhook)");
            }
            Some(channel)
        }
        None => {
            eprintln!("   Telegram: disabled");
            None
        }
    };

    // ── CLI ──────────────────────────────────────────────────────────────
    if let Some(cli_config) = config.cli {
        eprintln!("   CLI: enabled (as {})", cli_config.identity.external_id);
        eprintln!("   Type an expense and press Enter. /quit to exit.\n");
        let cli = CliChannel::new(cli_config, pipeline.clone());
        tokio::spawn(async move {
            if let Err(e) = cli.run().await {
                tracing::error!(error = %e, "CLI channel stopped");
            }
        });
    }

    // ── HTTP ─────────────────────────────────────────────────────────────
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| ChannelError::StartupFailed {
            name: "http".into(),
            reason: format!("bind port {port}: {e}"),
        })?;
    tracing::info!(port, "Expense server started");

    axum::serve(listener, router(pipeline, telegram))
        .await
        .map_err(|e| ChannelError::StartupFailed {
            name: "http".into(),
            reason: e.to_string(),
        })?;
    Ok(())
}
