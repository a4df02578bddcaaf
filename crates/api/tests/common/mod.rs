//! Test app wired to the in-memory stores.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::Request;
use axum::Router;

use sumi_api::boards::BoardRegistry;
use sumi_api::config::ServerConfig;
use sumi_api::router::build_app_router;
use sumi_api::state::AppState;
use sumi_core::build::{BuildStrategy, BuildTarget, DeferStrategy, SaneStrategy};
use sumi_core::error::CoreError;
use sumi_core::filters::PredicateRegistry;
use sumi_core::ports::{Dimensions, MediaProcessor, PageRenderer};
use sumi_pipeline::config::BoardConfig;
use sumi_pipeline::dispatch::BuildDispatcher;
use sumi_pipeline::markup::BasicMarkup;
use sumi_pipeline::memory::{
    MemoryBanStore, MemoryBuildQueue, MemoryFingerprintStore, MemoryFloodCache,
    MemoryMediaStore, MemoryPageStore, MemoryPostStore,
};
use sumi_pipeline::submit::SubmissionPipeline;

pub const BOUNDARY: &str = "sumi-test-boundary";

/// Accepts any byte blob as a 1x1 image.
struct StubProcessor;

#[async_trait]
impl MediaProcessor for StubProcessor {
    async fn decode(&self, _data: &[u8]) -> Result<Dimensions, CoreError> {
        Ok(Dimensions { width: 1, height: 1 })
    }

    async fn thumbnail(
        &self,
        data: &[u8],
        _max_w: u32,
        _max_h: u32,
    ) -> Result<Vec<u8>, CoreError> {
        Ok(data.to_vec())
    }
}

/// Renders the artifact key as the page body.
struct KeyRenderer;

#[async_trait]
impl PageRenderer for KeyRenderer {
    async fn render(&self, target: &BuildTarget) -> Result<Vec<u8>, CoreError> {
        Ok(target.artifact_key().into_bytes())
    }
}

pub struct TestApp {
    pub router: Router,
    pub bans: Arc<MemoryBanStore>,
    pub posts: Arc<MemoryPostStore>,
    pub queue: Arc<MemoryBuildQueue>,
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 5,
        boards: vec!["b".to_string()],
        flood_time_secs: 10,
        flood_time_ip_secs: 120,
        flood_time_same_secs: 30,
        dedup: None,
        build_strategies: vec!["sane".to_string(), "defer".to_string()],
        page_root: "./pages".to_string(),
        media_root: "./media".to_string(),
    }
}

/// Build an app serving board `b` with the given board configuration.
pub fn test_app(board_cfg: BoardConfig) -> TestApp {
    let posts = Arc::new(MemoryPostStore::new());
    let bans = Arc::new(MemoryBanStore::new());
    let queue = Arc::new(MemoryBuildQueue::new());

    let strategies: Vec<Box<dyn BuildStrategy>> =
        vec![Box::new(SaneStrategy), Box::new(DeferStrategy)];
    let dispatcher = Arc::new(BuildDispatcher::new(
        strategies,
        queue.clone(),
        Arc::new(MemoryPageStore::new()),
        Arc::new(KeyRenderer),
    ));

    let pipeline = Arc::new(SubmissionPipeline {
        posts: posts.clone(),
        bans: bans.clone(),
        flood: Arc::new(MemoryFloodCache::new()),
        fingerprints: Arc::new(MemoryFingerprintStore::new()),
        processor: Arc::new(StubProcessor),
        media: Arc::new(MemoryMediaStore::new()),
        markup: Arc::new(BasicMarkup),
        captcha: None,
        dnsbl: None,
        fetcher: None,
        predicates: PredicateRegistry::new(),
        dispatcher: dispatcher.clone(),
    });

    let mut boards = BoardRegistry::new();
    boards.insert("b".to_string(), board_cfg);

    let config = test_config();
    let state = AppState {
        pipeline,
        dispatcher,
        boards: Arc::new(boards),
        config: Arc::new(config.clone()),
    };
    TestApp {
        router: build_app_router(state, &config),
        bans,
        posts,
        queue,
    }
}

/// Hand-rolled multipart encoder for submit requests.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a submission to `/api/v1/boards/b/posts` from the given IP.
pub fn submit_request(ip: &str, fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/boards/b/posts")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-forwarded-for", ip)
        .body(Body::from(multipart_body(fields, files)))
        .expect("request build")
}
