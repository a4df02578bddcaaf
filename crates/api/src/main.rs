use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sumi_api::boards::BoardRegistry;
use sumi_api::config::ServerConfig;
use sumi_api::router::build_app_router;
use sumi_api::state::AppState;
use sumi_builder::pages::FsPageStore;
use sumi_builder::render::JsonPageRenderer;
use sumi_core::filters::PredicateRegistry;
use sumi_db::stores::{
    PgBanStore, PgBuildQueue, PgFingerprintStore, PgFloodCache, PgPostStore,
};
use sumi_pipeline::dispatch::{strategy_chain, BuildDispatcher};
use sumi_pipeline::markup::BasicMarkup;
use sumi_pipeline::media::ImageProcessor;
use sumi_pipeline::remote::HttpFetcher;
use sumi_pipeline::storage::FsMediaStore;
use sumi_pipeline::submit::SubmissionPipeline;

/// Largest upload fetched by URL.
const MAX_REMOTE_FETCH_BYTES: u64 = 8 * 1024 * 1024;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sumi_api=debug,sumi_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sumi_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    sumi_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    sumi_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Build dispatch ---
    let strategies = strategy_chain(&config.build_strategies)
        .expect("BUILD_STRATEGIES must name a valid chain");
    let queue = Arc::new(PgBuildQueue::new(pool.clone()));
    let pages = Arc::new(FsPageStore::new(&config.page_root));
    let renderer = Arc::new(JsonPageRenderer::new(pool.clone()));
    let dispatcher = Arc::new(BuildDispatcher::new(strategies, queue, pages, renderer));

    // --- Submission pipeline ---
    let pipeline = Arc::new(SubmissionPipeline {
        posts: Arc::new(PgPostStore::new(pool.clone())),
        bans: Arc::new(PgBanStore::new(pool.clone())),
        flood: Arc::new(PgFloodCache::new(pool.clone())),
        fingerprints: Arc::new(PgFingerprintStore::new(pool.clone())),
        processor: Arc::new(ImageProcessor),
        media: Arc::new(FsMediaStore::new(&config.media_root)),
        markup: Arc::new(BasicMarkup),
        captcha: None,
        dnsbl: None,
        fetcher: Some(Arc::new(HttpFetcher::new(
            reqwest::Client::new(),
            MAX_REMOTE_FETCH_BYTES,
        ))),
        predicates: PredicateRegistry::new(),
        dispatcher: dispatcher.clone(),
    });

    // --- App state and router ---
    let state = AppState {
        pipeline,
        dispatcher,
        boards: Arc::new(BoardRegistry::from_config(&config)),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
