//! Async ports at the storage and service seams.
//!
//! The pipeline orchestrates exclusively through these traits. Postgres
//! implementations live in `sumi-db`; single-node in-memory versions live
//! in `sumi-pipeline::memory`. Rendering, media decoding, CAPTCHA and
//! DNSBL verification are out-of-process collaborators consumed through
//! the narrow interfaces below.

use async_trait::async_trait;

use crate::build::{BuildTarget, BuildTask};
use crate::capacity::HardLimits;
use crate::error::CoreError;
use crate::fingerprint::DedupScope;
use crate::models::{ActiveBan, FloodEntry, NewBan, NewPost, PostFile, PostRef, ThreadMeta};
use crate::types::{DbId, Timestamp};

/// Durable post storage with per-board id sequencing.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a post, drawing its id from the board's atomic sequence
    /// counter. For new threads the returned id is also the thread id.
    ///
    /// Replies re-check `limits` against the thread's counters under the
    /// store's per-thread serialization (row lock / mutex), so two
    /// concurrent replies cannot both slip past a nearly-full thread.
    async fn insert_post(&self, post: &NewPost, limits: HardLimits) -> Result<DbId, CoreError>;

    /// Thread flags and pre-insert counters, or `None` if the thread does
    /// not exist (or the id refers to a reply).
    async fn thread_meta(&self, board: &str, thread: DbId)
        -> Result<Option<ThreadMeta>, CoreError>;

    /// Ids of all replies currently in a thread, in no particular order.
    async fn reply_ids(&self, board: &str, thread: DbId) -> Result<Vec<DbId>, CoreError>;

    /// Delete posts, returning the metadata of their files so the caller
    /// can remove the stored artifacts as well.
    async fn delete_posts(&self, board: &str, ids: &[DbId]) -> Result<Vec<PostFile>, CoreError>;

    /// Move a thread to the top of the index.
    async fn bump_thread(&self, board: &str, thread: DbId) -> Result<(), CoreError>;

    /// Number of index pages the board currently spans.
    async fn page_count(&self, board: &str) -> Result<u32, CoreError>;
}

/// Ban persistence and lookup.
#[async_trait]
pub trait BanStore: Send + Sync {
    async fn create_ban(&self, ban: &NewBan) -> Result<DbId, CoreError>;

    /// The most recent still-active ban for an IP, if any.
    async fn active_for_ip(&self, ip: &str, now: Timestamp)
        -> Result<Option<ActiveBan>, CoreError>;
}

/// Time-windowed flood cache, appended on every committed post.
#[async_trait]
pub trait FloodCache: Send + Sync {
    async fn append(&self, entry: &FloodEntry) -> Result<(), CoreError>;

    /// Count entries for `scope_key` on `board` with `time >= cutoff`.
    async fn count_since(
        &self,
        scope_key: &str,
        board: &str,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError>;

    /// Drop `board`'s entries older than `cutoff`. Returns the number
    /// removed. Scoped per board because retention windows differ per
    /// board config.
    async fn purge_older_than(&self, board: &str, cutoff: Timestamp) -> Result<u64, CoreError>;
}

/// Content fingerprint index for duplicate detection.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Find a previously recorded post with this fingerprint. With
    /// [`DedupScope::Thread`], only hits inside `thread` count.
    async fn lookup(
        &self,
        hash: &str,
        scope: DedupScope,
        board: &str,
        thread: Option<DbId>,
    ) -> Result<Option<PostRef>, CoreError>;

    /// Record a fingerprint. Called only after the post and its files are
    /// durably committed.
    async fn record(&self, hash: &str, post: &PostRef) -> Result<(), CoreError>;

    /// Remove fingerprints owned by deleted posts.
    async fn forget(&self, board: &str, posts: &[DbId]) -> Result<(), CoreError>;
}

/// Multi-producer FIFO of deferred build tasks.
///
/// Consumers may observe duplicate targets; task execution is idempotent
/// so duplicates are harmless re-renders.
#[async_trait]
pub trait BuildQueue: Send + Sync {
    async fn enqueue(&self, target: &BuildTarget) -> Result<DbId, CoreError>;

    /// Claim the oldest pending task, marking it running. `None` when the
    /// queue is empty.
    async fn claim_next(&self) -> Result<Option<BuildTask>, CoreError>;

    async fn mark_done(&self, task: DbId) -> Result<(), CoreError>;

    /// Mark failed; the task stays eligible for a later retry pass.
    async fn mark_failed(&self, task: DbId, error: &str) -> Result<(), CoreError>;
}

/// Persisted page artifacts plus their staleness markers.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn write(&self, target: &BuildTarget, bytes: &[u8]) -> Result<(), CoreError>;

    async fn read(&self, target: &BuildTarget) -> Result<Option<Vec<u8>>, CoreError>;

    /// Mark a page so the next reader triggers a synchronous rebuild.
    async fn mark_stale(&self, target: &BuildTarget) -> Result<(), CoreError>;

    async fn is_stale(&self, target: &BuildTarget) -> Result<bool, CoreError>;
}

/// Image dimensions extracted by the media processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Decoding and thumbnailing, typically an out-of-process concern.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Probe dimensions; a failure rejects the upload.
    async fn decode(&self, data: &[u8]) -> Result<Dimensions, CoreError>;

    /// Produce a thumbnail no larger than `max_w` x `max_h`.
    async fn thumbnail(&self, data: &[u8], max_w: u32, max_h: u32)
        -> Result<Vec<u8>, CoreError>;
}

/// Handle to media staged in temporary storage, before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMedia {
    pub id: String,
    pub size: u64,
}

/// Two-phase media storage.
///
/// Files are staged before the dedup check and either committed into
/// permanent storage or discarded as compensating cleanup; no transaction
/// spans the database commit and the file system.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn stage(
        &self,
        name: &str,
        data: &[u8],
        thumb: Option<&[u8]>,
    ) -> Result<StagedMedia, CoreError>;

    /// Promote staged media; returns the permanent path and thumbnail path.
    async fn commit(&self, staged: &StagedMedia)
        -> Result<(String, Option<String>), CoreError>;

    /// Delete staged media and any thumbnail produced for it.
    async fn discard(&self, staged: &StagedMedia) -> Result<(), CoreError>;

    /// Remove a committed file by its permanent path, e.g. during
    /// cyclical-thread eviction.
    async fn remove(&self, path: &str) -> Result<(), CoreError>;
}

/// Body markup rendering and citation extraction.
#[async_trait]
pub trait MarkupRenderer: Send + Sync {
    /// Render raw body text to HTML and collect cited post ids.
    async fn render(&self, board: &str, raw: &str) -> Result<(String, Vec<DbId>), CoreError>;
}

/// Static page rendering. Re-rendering an already current page must be a
/// harmless overwrite; the build worker relies on that for idempotence.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, target: &BuildTarget) -> Result<Vec<u8>, CoreError>;
}

/// CAPTCHA provider verification. Callers bound this with a timeout and
/// treat any error as rejection.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str, ip: &str) -> Result<bool, CoreError>;
}

/// DNS blacklist lookup for submitter IPs.
#[async_trait]
pub trait DnsBlacklist: Send + Sync {
    async fn is_listed(&self, ip: &str) -> Result<bool, CoreError>;
}

/// Remote fetch for upload-by-URL submissions.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CoreError>;
}
