use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use vigil_core::{FaceMeshDetector, LivenessPipeline, ModelDigest};

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("vigild starting");

    let config = config::Config::from_env();
    tracing::info!(
        bind_addr = %config.bind_addr,
        model = %config.model_path.display(),
        timeout_secs = config.request_timeout_secs,
        "configuration loaded"
    );

    let thresholds = config.thresholds().context("failed to load thresholds")?;

    let pinned = config
        .model_sha256
        .as_deref()
        .map(str::parse::<ModelDigest>)
        .transpose()
        .context("invalid VIGIL_MODEL_SHA256")?;
    let detector =
        FaceMeshDetector::load_verified(&config.model_path, thresholds.face_score_min, pinned.as_ref())
            .context("failed to load face mesh model")?;

    let pipeline = LivenessPipeline::new(thresholds, Arc::new(detector));
    let engine = engine::spawn_engine(
        pipeline,
        config.engine_queue,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("failed to start liveness engine")?;

    let state = http::AppState {
        engine,
        started_at: chrono::Utc::now(),
    };
    let app = http::router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "vigild ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    tracing::info!("vigild shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
