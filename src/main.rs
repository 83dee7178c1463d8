use anyhow::Context;
use dotenvy::dotenv;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use learnserver::build_router;
use learnserver::core::config::AppConfig;
use learnserver::core::rate_limit::spawn_sweeper;
use learnserver::core::shared::state::AppState;
use learnserver::core::shared::utils::{create_conn, run_migrations};
use learnserver::llm::OpenAIClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    info!("Starting learnserver v{}", env!("CARGO_PKG_VERSION"));

    let pool = create_conn(&config.database).context("Failed to create database pool")?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;

    if config.llm.api_key.is_empty() {
        warn!("LLM_API_KEY is not set; AI features will fail unless the endpoint needs no key");
    }
    if !config.media.is_configured() {
        warn!("Media credentials are not set; upload signatures are disabled");
    }
    let llm = OpenAIClient::new(&config.llm).context("Failed to build LLM client")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid SERVER_HOST/SERVER_PORT")?;

    let state = Arc::new(AppState::new(pool, config, Arc::new(llm)));
    let sweeper = spawn_sweeper(&state.rate_limits);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
