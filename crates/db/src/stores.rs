//! `sumi_core::ports` implementations backed by Postgres.
//!
//! Thin adapters over the repositories; sqlx failures surface as
//! `CoreError::Internal` since the pipeline treats storage loss as
//! non-actionable.

use async_trait::async_trait;
use sumi_core::build::{BuildTarget, BuildTask};
use sumi_core::capacity::HardLimits;
use sumi_core::error::CoreError;
use sumi_core::fingerprint::DedupScope;
use sumi_core::models::{ActiveBan, FloodEntry, NewBan, NewPost, PostFile, PostRef, ThreadMeta};
use sumi_core::ports::{BanStore, BuildQueue, FingerprintStore, FloodCache, PostStore};
use sumi_core::types::{DbId, Timestamp};

use crate::repositories::{BanRepo, BuildTaskRepo, FingerprintRepo, FloodRepo, PostInsert, PostRepo};
use crate::DbPool;

fn storage_err(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("storage error: {e}"))
}

#[derive(Clone)]
pub struct PgPostStore {
    pool: DbPool,
}

impl PgPostStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert_post(&self, post: &NewPost, limits: HardLimits) -> Result<DbId, CoreError> {
        match PostRepo::insert(&self.pool, post, limits)
            .await
            .map_err(storage_err)?
        {
            PostInsert::Committed(id) => Ok(id),
            PostInsert::Rejected(e) => Err(e),
        }
    }

    async fn thread_meta(
        &self,
        board: &str,
        thread: DbId,
    ) -> Result<Option<ThreadMeta>, CoreError> {
        let row = PostRepo::thread_meta(&self.pool, board, thread)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn reply_ids(&self, board: &str, thread: DbId) -> Result<Vec<DbId>, CoreError> {
        PostRepo::reply_ids(&self.pool, board, thread)
            .await
            .map_err(storage_err)
    }

    async fn delete_posts(&self, board: &str, ids: &[DbId]) -> Result<Vec<PostFile>, CoreError> {
        let files = PostRepo::delete(&self.pool, board, ids)
            .await
            .map_err(storage_err)?;
        Ok(files.into_iter().map(Into::into).collect())
    }

    async fn bump_thread(&self, board: &str, thread: DbId) -> Result<(), CoreError> {
        PostRepo::bump(&self.pool, board, thread)
            .await
            .map_err(storage_err)
    }

    async fn page_count(&self, board: &str) -> Result<u32, CoreError> {
        PostRepo::page_count(&self.pool, board)
            .await
            .map_err(storage_err)
    }
}

#[derive(Clone)]
pub struct PgBanStore {
    pool: DbPool,
}

impl PgBanStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BanStore for PgBanStore {
    async fn create_ban(&self, ban: &NewBan) -> Result<DbId, CoreError> {
        BanRepo::create(&self.pool, ban).await.map_err(storage_err)
    }

    async fn active_for_ip(
        &self,
        ip: &str,
        now: Timestamp,
    ) -> Result<Option<ActiveBan>, CoreError> {
        let row = BanRepo::active_for_ip(&self.pool, ip, now)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }
}

#[derive(Clone)]
pub struct PgFloodCache {
    pool: DbPool,
}

impl PgFloodCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FloodCache for PgFloodCache {
    async fn append(&self, entry: &FloodEntry) -> Result<(), CoreError> {
        FloodRepo::append(&self.pool, entry).await.map_err(storage_err)
    }

    async fn count_since(
        &self,
        scope_key: &str,
        board: &str,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError> {
        FloodRepo::count_since(&self.pool, scope_key, board, cutoff)
            .await
            .map_err(storage_err)
    }

    async fn purge_older_than(&self, board: &str, cutoff: Timestamp) -> Result<u64, CoreError> {
        FloodRepo::purge_older_than(&self.pool, board, cutoff)
            .await
            .map_err(storage_err)
    }
}

#[derive(Clone)]
pub struct PgFingerprintStore {
    pool: DbPool,
}

impl PgFingerprintStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintStore for PgFingerprintStore {
    async fn lookup(
        &self,
        hash: &str,
        scope: DedupScope,
        board: &str,
        thread: Option<DbId>,
    ) -> Result<Option<PostRef>, CoreError> {
        let row = match (scope, thread) {
            (DedupScope::Global, _) => FingerprintRepo::lookup_global(&self.pool, hash)
                .await
                .map_err(storage_err)?,
            (DedupScope::Thread, Some(thread)) => {
                FingerprintRepo::lookup_in_thread(&self.pool, hash, board, thread)
                    .await
                    .map_err(storage_err)?
            }
            // A brand new thread has no in-thread history to collide with.
            (DedupScope::Thread, None) => None,
        };
        Ok(row.map(Into::into))
    }

    async fn record(&self, hash: &str, post: &PostRef) -> Result<(), CoreError> {
        FingerprintRepo::record(&self.pool, hash, post)
            .await
            .map_err(storage_err)
    }

    async fn forget(&self, board: &str, posts: &[DbId]) -> Result<(), CoreError> {
        FingerprintRepo::forget(&self.pool, board, posts)
            .await
            .map_err(storage_err)
    }
}

#[derive(Clone)]
pub struct PgBuildQueue {
    pool: DbPool,
}

impl PgBuildQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildQueue for PgBuildQueue {
    async fn enqueue(&self, target: &BuildTarget) -> Result<DbId, CoreError> {
        BuildTaskRepo::enqueue(&self.pool, target)
            .await
            .map_err(storage_err)
    }

    async fn claim_next(&self) -> Result<Option<BuildTask>, CoreError> {
        let row = BuildTaskRepo::claim_next(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => row.into_task().map(Some).map_err(CoreError::Internal),
            None => Ok(None),
        }
    }

    async fn mark_done(&self, task: DbId) -> Result<(), CoreError> {
        BuildTaskRepo::mark_done(&self.pool, task)
            .await
            .map_err(storage_err)
    }

    async fn mark_failed(&self, task: DbId, error: &str) -> Result<(), CoreError> {
        BuildTaskRepo::mark_failed(&self.pool, task, error)
            .await
            .map_err(storage_err)
    }
}
