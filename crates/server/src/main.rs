//! shellcache server entry point.
//!
//! Boots the caching worker and serves pages through it over HTTP.
//! Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::Result;
use shellcache_core::{AppConfig, CacheDb};
use shellcache_worker::{FetchClient, FetchConfig, Worker, WorkerConfig};
use tracing_subscriber::EnvFilter;

mod error;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let worker_config = WorkerConfig::from_app_config(&config)?;
    tracing::info!(generation = %worker_config.generation.name(), origin = %worker_config.origin, "Starting shellcache on {}", config.listen_addr);

    let store = CacheDb::open(&config.db_path).await?;
    let fetcher = FetchClient::new(FetchConfig::from_app_config(&config))?;
    let worker = Arc::new(Worker::new(worker_config, store, Arc::new(fetcher))?);

    if let Err(e) = worker.start().await {
        tracing::error!("install failed, serving without a new generation: {}", e);
    }

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, routes::router(worker.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    worker.drain_background().await;
    Ok(())
}
