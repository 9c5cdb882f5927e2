//! Meme Harvester — Binary Entrypoint
//! Boots the Axum control surface and the nightly fetch scheduler.
//!
//! See `README.md` for quickstart and configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meme_harvester::api::{self, AppState};
use meme_harvester::config::AppConfig;
use meme_harvester::media::PassthroughMirror;
use meme_harvester::metrics::Metrics;
use meme_harvester::scheduler::Scheduler;
use meme_harvester::store::FileStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("meme_harvester=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("loading configuration")?;
    let metrics = Metrics::init();

    let store = Arc::new(FileStore::load(&cfg.state_path));
    let scheduler = Scheduler::new(&cfg, store, Arc::new(PassthroughMirror))?;
    // Honors SCHEDULER_ENABLED internally.
    scheduler.start()?;

    let router = api::create_router(AppState {
        scheduler: scheduler.clone(),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .with_context(|| format!("binding port {}", cfg.port))?;
    info!(port = cfg.port, "meme harvester listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
