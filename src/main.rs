use expense_intake::app;
use expense_intake::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export SUPABASE_URL=https://<project>.supabase.co SUPABASE_API_KEY=...");
        eprintln!("  export OPENAI_API_KEY=sk-...   (or EXPENSE_LLM_BACKEND=anthropic)");
        std::process::exit(1);
    });

    app::run(config).await?;
    Ok(())
}
