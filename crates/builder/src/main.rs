use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sumi_builder::config::BuilderConfig;
use sumi_builder::pages::FsPageStore;
use sumi_builder::render::JsonPageRenderer;
use sumi_db::repositories::BuildTaskRepo;
use sumi_pipeline::worker::DeferredBuildWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sumi_builder=debug,sumi_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BuilderConfig::from_env();
    let pool = sumi_db::create_pool(&config.database_url).await?;
    sumi_db::health_check(&pool).await?;
    tracing::info!(page_root = %config.page_root, "Build worker connecting");

    let queue = Arc::new(sumi_db::stores::PgBuildQueue::new(pool.clone()));
    let pages = Arc::new(FsPageStore::new(&config.page_root));
    let renderer = Arc::new(JsonPageRenderer::new(pool.clone()));
    let worker = DeferredBuildWorker::new(queue, pages, renderer)
        .with_poll_interval(Duration::from_millis(config.poll_interval_ms));

    let cancel = CancellationToken::new();

    // Periodic retry pass: failed tasks go back to pending.
    let retry_pool = pool.clone();
    let retry_cancel = cancel.clone();
    let retry_interval = Duration::from_secs(config.retry_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(retry_interval);
        loop {
            tokio::select! {
                _ = retry_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match BuildTaskRepo::requeue_failed(&retry_pool).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(requeued = n, "Failed build tasks requeued"),
                        Err(e) => tracing::error!(error = %e, "Retry pass failed"),
                    }
                }
            }
        }
    });

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown_cancel.cancel();
        }
    });

    worker.run(cancel).await;
    Ok(())
}
