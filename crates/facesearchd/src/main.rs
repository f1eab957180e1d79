use anyhow::{Context, Result};
use facesearch_core::OnnxExtractor;
use facesearch_store::{LocalObjectStore, SqliteFaceStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod ingest;
mod routes;
mod server;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("facesearchd starting");

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        objects = %config.object_root.display(),
        threshold = config.similarity_threshold,
        max_results = config.max_results,
        "configuration loaded"
    );

    let extractor = OnnxExtractor::from_dir(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    tracing::info!("face models loaded");
    let engine = engine::spawn_engine(extractor).context("failed to start engine")?;

    let faces = SqliteFaceStore::open(&config.db_path)
        .await
        .context("failed to open face database")?;
    let objects = LocalObjectStore::new(&config.object_root, &config.public_url);

    let watermark = match &config.watermark_path {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("failed to read watermark {}", path.display()))?,
        ),
        None => None,
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    let mut state = AppState::new(config, engine, Arc::new(faces), Arc::new(objects));
    if let Some(bytes) = watermark {
        state = state.with_watermark(bytes);
    }

    tracing::info!(addr = %state.config.bind_addr, "facesearchd ready");
    server::serve(listener, Arc::new(state)).await?;

    tracing::info!("facesearchd shutting down");
    Ok(())
}
