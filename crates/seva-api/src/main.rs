//! # seva-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the Seva portal.
//! Binds to configurable port (default 8080).

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use seva_api::config::{AppConfig, LogFormat};
use seva_api::middleware::metrics::install_recorder;
use seva_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();

    // Initialize structured tracing.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(config = ?config, "starting seva-api");

    let metrics = install_recorder().map_err(anyhow::Error::msg)?;

    // Initialize database pool (optional: absent means in-memory only).
    let db_pool = seva_api::db::init_pool(config.database_url.as_deref())
        .await
        .context("database initialization failed")?;

    let port = config.port;
    let state = AppState::with_config(config, db_pool).with_metrics(metrics);

    // Hydrate in-memory stores from database (if connected).
    state
        .hydrate_from_db()
        .await
        .context("database hydration failed")?;

    let app = seva_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Seva API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
