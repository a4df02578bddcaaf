//! Shared fixtures: in-memory harness plus stub collaborators.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use sumi_core::build::{BuildStrategy, BuildTarget};
use sumi_core::error::CoreError;
use sumi_core::filters::PredicateRegistry;
use sumi_core::models::{FileUpload, PostCandidate};
use sumi_core::ports::{CaptchaVerifier, Dimensions, MediaProcessor, PageRenderer};
use sumi_pipeline::dispatch::BuildDispatcher;
use sumi_pipeline::markup::BasicMarkup;
use sumi_pipeline::memory::{
    MemoryBanStore, MemoryBuildQueue, MemoryFingerprintStore, MemoryFloodCache,
    MemoryMediaStore, MemoryPageStore, MemoryPostStore,
};
use sumi_pipeline::submit::{SubmissionPipeline, SubmitRequest};

/// Accepts any byte blob as a 1x1 image; the thumbnail is the input.
pub struct StubProcessor;

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

/// Renders the artifact key as the page body and counts invocations.
#[derive(Default)]
pub struct CountingRenderer {
    pub renders: AtomicUsize,
}

#[async_trait]
impl PageRenderer for CountingRenderer {
    async fn render(&self, target: &BuildTarget) -> Result<Vec<u8>, CoreError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(target.artifact_key().into_bytes())
    }
}

/// Fails the first `fail_first` renders, then succeeds.
pub struct FlakyRenderer {
    pub fail_first: usize,
    pub calls: AtomicUsize,
}

impl FlakyRenderer {
    pub fn new(fail_first: usize) -> Self {
        Self { fail_first, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl PageRenderer for FlakyRenderer {
    async fn render(&self, target: &BuildTarget) -> Result<Vec<u8>, CoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(CoreError::Build("template exploded".to_string()));
        }
        Ok(target.artifact_key().into_bytes())
    }
}

/// Fixed-verdict CAPTCHA.
pub struct StubCaptcha {
    pub ok: bool,
}

#[async_trait]
impl CaptchaVerifier for StubCaptcha {
    async fn verify(&self, _token: &str, _ip: &str) -> Result<bool, CoreError> {
        Ok(self.ok)
    }
}

/// Never answers within any sane timeout.
pub struct HangingCaptcha;

#[async_trait]
impl CaptchaVerifier for HangingCaptcha {
    async fn verify(&self, _token: &str, _ip: &str) -> Result<bool, CoreError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(true)
    }
}

/// Pipeline wired entirely to in-memory stores, with handles kept for
/// assertions.
pub struct Harness {
    pub posts: Arc<MemoryPostStore>,
    pub bans: Arc<MemoryBanStore>,
    pub flood: Arc<MemoryFloodCache>,
    pub fingerprints: Arc<MemoryFingerprintStore>,
    pub media: Arc<MemoryMediaStore>,
    pub queue: Arc<MemoryBuildQueue>,
    pub pages: Arc<MemoryPageStore>,
    pub renderer: Arc<CountingRenderer>,
    pub pipeline: SubmissionPipeline,
}

pub fn harness(strategies: Vec<Box<dyn BuildStrategy>>) -> Harness {
    let posts = Arc::new(MemoryPostStore::new());
    let bans = Arc::new(MemoryBanStore::new());
    let flood = Arc::new(MemoryFloodCache::new());
    let fingerprints = Arc::new(MemoryFingerprintStore::new());
    let media = Arc::new(MemoryMediaStore::new());
    let queue = Arc::new(MemoryBuildQueue::new());
    let pages = Arc::new(MemoryPageStore::new());
    let renderer = Arc::new(CountingRenderer::default());

    let dispatcher = Arc::new(BuildDispatcher::new(
        strategies,
        queue.clone(),
        pages.clone(),
        renderer.clone(),
    ));
    let pipeline = SubmissionPipeline {
        posts: posts.clone(),
        bans: bans.clone(),
        flood: flood.clone(),
        fingerprints: fingerprints.clone(),
        processor: Arc::new(StubProcessor),
        media: media.clone(),
        markup: Arc::new(BasicMarkup),
        captcha: None,
        dnsbl: None,
        fetcher: None,
        predicates: PredicateRegistry::new(),
        dispatcher,
    };

    Harness { posts, bans, flood, fingerprints, media, queue, pages, renderer, pipeline }
}

pub fn candidate(board: &str, thread: Option<i64>, ip: &str, body: &str) -> PostCandidate {
    PostCandidate {
        board: board.to_string(),
        thread,
        ip: ip.to_string(),
        name: String::new(),
        email: String::new(),
        subject: String::new(),
        body: body.to_string(),
        files: Vec::new(),
        moderator: false,
    }
}

pub fn with_file(mut c: PostCandidate, name: &str, data: &[u8]) -> PostCandidate {
    c.files.push(FileUpload {
        name: name.to_string(),
        mime: "image/png".to_string(),
        data: data.to_vec(),
    });
    c
}

pub fn request(candidate: PostCandidate) -> SubmitRequest {
    SubmitRequest { candidate, captcha_token: None, file_url: None }
}
