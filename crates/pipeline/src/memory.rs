//! In-memory implementations of the storage ports.
//!
//! Single-node stand-ins for the Postgres-backed stores, also the
//! backbone of the integration tests. All state lives behind plain
//! mutexes; no lock is held across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use sumi_core::build::{BuildTarget, BuildTask, TaskStatus};
use sumi_core::capacity::{check_hard_limits, HardLimits};
use sumi_core::error::CoreError;
use sumi_core::fingerprint::DedupScope;
use sumi_core::models::{
    ActiveBan, FloodEntry, NewBan, NewPost, PostFile, PostRef, ThreadFlags, ThreadMeta,
};
use sumi_core::ports::{
    BanStore, BuildQueue, FingerprintStore, FloodCache, MediaStore, PageStore, PostStore,
    StagedMedia,
};
use sumi_core::types::{DbId, Timestamp};

const THREADS_PER_PAGE: usize = 10;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredPost {
    id: DbId,
    thread: Option<DbId>,
    files: Vec<PostFile>,
    flags: ThreadFlags,
    bump: Timestamp,
}

#[derive(Debug, Default)]
struct BoardState {
    counter: DbId,
    posts: Vec<StoredPost>,
}

/// Post storage with per-board sequence counters.
#[derive(Default)]
pub struct MemoryPostStore {
    boards: Mutex<HashMap<String, BoardState>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set moderation flags on a thread OP.
    pub fn set_thread_flags(&self, board: &str, thread: DbId, flags: ThreadFlags) {
        let mut boards = lock(&self.boards);
        if let Some(state) = boards.get_mut(board) {
            if let Some(op) = state
                .posts
                .iter_mut()
                .find(|p| p.id == thread && p.thread.is_none())
            {
                op.flags = flags;
            }
        }
    }

    /// Ids of every post currently on a board, in insertion order.
    pub fn post_ids(&self, board: &str) -> Vec<DbId> {
        let boards = lock(&self.boards);
        boards
            .get(board)
            .map(|s| s.posts.iter().map(|p| p.id).collect())
            .unwrap_or_default()
    }

    /// Threads on a board ordered by bump time, most recent first.
    pub fn threads_by_bump(&self, board: &str) -> Vec<DbId> {
        let boards = lock(&self.boards);
        let Some(state) = boards.get(board) else {
            return Vec::new();
        };
        let mut ops: Vec<_> = state
            .posts
            .iter()
            .filter(|p| p.thread.is_none())
            .map(|p| (p.bump, p.id))
            .collect();
        ops.sort_by(|a, b| b.cmp(a));
        ops.into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert_post(&self, post: &NewPost, limits: HardLimits) -> Result<DbId, CoreError> {
        let mut boards = lock(&self.boards);
        let state = boards.entry(post.board.clone()).or_default();

        // Replies re-check capacity while holding the store lock; the
        // pipeline's earlier gate reads counts without one.
        if let Some(thread) = post.thread {
            let Some(op) = state
                .posts
                .iter()
                .find(|p| p.id == thread && p.thread.is_none())
            else {
                return Err(CoreError::NotFound { entity: "thread", id: thread });
            };
            let replies: Vec<_> = state
                .posts
                .iter()
                .filter(|p| p.thread == Some(thread))
                .collect();
            let meta = ThreadMeta {
                board: post.board.clone(),
                id: thread,
                reply_count: replies.len() as i64,
                image_count: replies.iter().filter(|p| !p.files.is_empty()).count() as i64,
                flags: op.flags,
            };
            check_hard_limits(&meta, !post.files.is_empty(), limits)?;
        }

        state.counter += 1;
        let id = state.counter;
        state.posts.push(StoredPost {
            id,
            thread: post.thread,
            files: post.files.clone(),
            flags: ThreadFlags::default(),
            bump: post.time,
        });
        Ok(id)
    }

    async fn thread_meta(
        &self,
        board: &str,
        thread: DbId,
    ) -> Result<Option<ThreadMeta>, CoreError> {
        let boards = lock(&self.boards);
        let Some(state) = boards.get(board) else {
            return Ok(None);
        };
        let Some(op) = state
            .posts
            .iter()
            .find(|p| p.id == thread && p.thread.is_none())
        else {
            return Ok(None);
        };
        let replies: Vec<_> = state
            .posts
            .iter()
            .filter(|p| p.thread == Some(thread))
            .collect();
        Ok(Some(ThreadMeta {
            board: board.to_string(),
            id: thread,
            reply_count: replies.len() as i64,
            image_count: replies.iter().filter(|p| !p.files.is_empty()).count() as i64,
            flags: op.flags,
        }))
    }

    async fn reply_ids(&self, board: &str, thread: DbId) -> Result<Vec<DbId>, CoreError> {
        let boards = lock(&self.boards);
        Ok(boards
            .get(board)
            .map(|s| {
                s.posts
                    .iter()
                    .filter(|p| p.thread == Some(thread))
                    .map(|p| p.id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_posts(&self, board: &str, ids: &[DbId]) -> Result<Vec<PostFile>, CoreError> {
        let mut boards = lock(&self.boards);
        let Some(state) = boards.get_mut(board) else {
            return Ok(Vec::new());
        };
        let mut files = Vec::new();
        state.posts.retain(|p| {
            if ids.contains(&p.id) {
                files.extend(p.files.iter().cloned());
                false
            } else {
                true
            }
        });
        Ok(files)
    }

    async fn bump_thread(&self, board: &str, thread: DbId) -> Result<(), CoreError> {
        let mut boards = lock(&self.boards);
        let op = boards.get_mut(board).and_then(|s| {
            s.posts
                .iter_mut()
                .find(|p| p.id == thread && p.thread.is_none())
        });
        match op {
            Some(op) => {
                op.bump = chrono::Utc::now();
                Ok(())
            }
            None => Err(CoreError::NotFound { entity: "thread", id: thread }),
        }
    }

    async fn page_count(&self, board: &str) -> Result<u32, CoreError> {
        let boards = lock(&self.boards);
        let threads = boards
            .get(board)
            .map(|s| s.posts.iter().filter(|p| p.thread.is_none()).count())
            .unwrap_or(0);
        Ok(threads.div_ceil(THREADS_PER_PAGE).max(1) as u32)
    }
}

// ---------------------------------------------------------------------------
// Bans
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBanStore {
    bans: Mutex<Vec<(DbId, String, ActiveBan)>>,
    next_id: AtomicI64,
}

impl MemoryBanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BanStore for MemoryBanStore {
    async fn create_ban(&self, ban: &NewBan) -> Result<DbId, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.bans).push((
            id,
            ban.ip.clone(),
            ActiveBan { id, reason: ban.reason.clone(), expires: ban.expires },
        ));
        Ok(id)
    }

    async fn active_for_ip(
        &self,
        ip: &str,
        now: Timestamp,
    ) -> Result<Option<ActiveBan>, CoreError> {
        let bans = lock(&self.bans);
        Ok(bans
            .iter()
            .rev()
            .find(|(_, banned_ip, ban)| {
                banned_ip == ip && ban.expires.is_none_or(|e| e > now)
            })
            .map(|(_, _, ban)| ban.clone()))
    }
}

// ---------------------------------------------------------------------------
// Flood cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFloodCache {
    entries: Mutex<Vec<FloodEntry>>,
}

impl MemoryFloodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FloodCache for MemoryFloodCache {
    async fn append(&self, entry: &FloodEntry) -> Result<(), CoreError> {
        lock(&self.entries).push(entry.clone());
        Ok(())
    }

    async fn count_since(
        &self,
        scope_key: &str,
        board: &str,
        cutoff: Timestamp,
    ) -> Result<u64, CoreError> {
        let entries = lock(&self.entries);
        Ok(entries
            .iter()
            .filter(|e| e.scope_key == scope_key && e.board == board && e.time >= cutoff)
            .count() as u64)
    }

    async fn purge_older_than(&self, board: &str, cutoff: Timestamp) -> Result<u64, CoreError> {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|e| e.board != board || e.time >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFingerprintStore {
    entries: Mutex<Vec<(String, PostRef)>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for MemoryFingerprintStore {
    async fn lookup(
        &self,
        hash: &str,
        scope: DedupScope,
        board: &str,
        thread: Option<DbId>,
    ) -> Result<Option<PostRef>, CoreError> {
        let entries = lock(&self.entries);
        // Insertion order doubles as recording order, so the first hit is
        // the oldest original.
        let hit = entries.iter().find(|(h, post)| {
            if h != hash {
                return false;
            }
            match (scope, thread) {
                (DedupScope::Global, _) => true,
                (DedupScope::Thread, Some(t)) => {
                    post.board == board && (post.thread == Some(t) || post.post == t)
                }
                (DedupScope::Thread, None) => false,
            }
        });
        Ok(hit.map(|(_, post)| post.clone()))
    }

    async fn record(&self, hash: &str, post: &PostRef) -> Result<(), CoreError> {
        let mut entries = lock(&self.entries);
        if !entries.iter().any(|(h, p)| h == hash && p == post) {
            entries.push((hash.to_string(), post.clone()));
        }
        Ok(())
    }

    async fn forget(&self, board: &str, posts: &[DbId]) -> Result<(), CoreError> {
        let mut entries = lock(&self.entries);
        entries.retain(|(_, p)| !(p.board == board && posts.contains(&p.post)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Build queue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBuildQueue {
    tasks: Mutex<Vec<BuildTask>>,
    next_id: AtomicI64,
}

impl MemoryBuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every task, for assertions.
    pub fn tasks(&self) -> Vec<BuildTask> {
        lock(&self.tasks).clone()
    }

    /// Move failed tasks back to pending. Returns the number requeued.
    pub fn requeue_failed(&self) -> u64 {
        let mut tasks = lock(&self.tasks);
        let mut requeued = 0;
        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Failed {
                task.status = TaskStatus::Pending;
                task.error = None;
                requeued += 1;
            }
        }
        requeued
    }
}

#[async_trait]
impl BuildQueue for MemoryBuildQueue {
    async fn enqueue(&self, target: &BuildTarget) -> Result<DbId, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.tasks).push(BuildTask {
            id,
            target: target.clone(),
            status: TaskStatus::Pending,
            error: None,
            created: chrono::Utc::now(),
        });
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<BuildTask>, CoreError> {
        let mut tasks = lock(&self.tasks);
        let next = tasks
            .iter_mut()
            .find(|t| t.status == TaskStatus::Pending);
        match next {
            Some(task) => {
                task.status = TaskStatus::Running;
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_done(&self, task: DbId) -> Result<(), CoreError> {
        self.transition(task, TaskStatus::Done, None)
    }

    async fn mark_failed(&self, task: DbId, error: &str) -> Result<(), CoreError> {
        self.transition(task, TaskStatus::Failed, Some(error.to_string()))
    }
}

impl MemoryBuildQueue {
    fn transition(
        &self,
        id: DbId,
        to: TaskStatus,
        error: Option<String>,
    ) -> Result<(), CoreError> {
        let mut tasks = lock(&self.tasks);
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            return Err(CoreError::NotFound { entity: "build_task", id });
        };
        if !task.status.can_transition(to) {
            return Err(CoreError::Internal(format!(
                "invalid build task transition {:?} -> {:?}",
                task.status, to
            )));
        }
        task.status = to;
        task.error = error;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct PageSlot {
    bytes: Option<Vec<u8>>,
    stale: bool,
}

#[derive(Default)]
pub struct MemoryPageStore {
    pages: Mutex<HashMap<String, PageSlot>>,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PageStore for MemoryPageStore {
    async fn write(&self, target: &BuildTarget, bytes: &[u8]) -> Result<(), CoreError> {
        let mut pages = lock(&self.pages);
        pages.insert(
            target.artifact_key(),
            PageSlot { bytes: Some(bytes.to_vec()), stale: false },
        );
        Ok(())
    }

    async fn read(&self, target: &BuildTarget) -> Result<Option<Vec<u8>>, CoreError> {
        let pages = lock(&self.pages);
        Ok(pages
            .get(&target.artifact_key())
            .and_then(|slot| slot.bytes.clone()))
    }

    async fn mark_stale(&self, target: &BuildTarget) -> Result<(), CoreError> {
        let mut pages = lock(&self.pages);
        pages.entry(target.artifact_key()).or_default().stale = true;
        Ok(())
    }

    async fn is_stale(&self, target: &BuildTarget) -> Result<bool, CoreError> {
        let pages = lock(&self.pages);
        Ok(pages
            .get(&target.artifact_key())
            .is_some_and(|slot| slot.stale))
    }
}

// ---------------------------------------------------------------------------
// Media store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StagedFile {
    name: String,
    size: u64,
    has_thumb: bool,
}

#[derive(Default)]
pub struct MemoryMediaStore {
    staged: Mutex<HashMap<String, StagedFile>>,
    committed: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    next_id: AtomicI64,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staged_count(&self) -> usize {
        lock(&self.staged).len()
    }

    pub fn committed_paths(&self) -> Vec<String> {
        lock(&self.committed).clone()
    }

    pub fn removed_paths(&self) -> Vec<String> {
        lock(&self.removed).clone()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn stage(
        &self,
        name: &str,
        data: &[u8],
        thumb: Option<&[u8]>,
    ) -> Result<StagedMedia, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("staged-{id}");
        lock(&self.staged).insert(
            id.clone(),
            StagedFile {
                name: name.to_string(),
                size: data.len() as u64,
                has_thumb: thumb.is_some(),
            },
        );
        Ok(StagedMedia { id, size: data.len() as u64 })
    }

    async fn commit(
        &self,
        staged: &StagedMedia,
    ) -> Result<(String, Option<String>), CoreError> {
        let file = lock(&self.staged).remove(&staged.id).ok_or_else(|| {
            CoreError::Resource(format!("staged media {} not found", staged.id))
        })?;
        let path = format!("media/{}/{}", staged.id, file.name);
        let thumb = file
            .has_thumb
            .then(|| format!("media/{}/t_{}", staged.id, file.name));
        lock(&self.committed).push(path.clone());
        Ok((path, thumb))
    }

    async fn discard(&self, staged: &StagedMedia) -> Result<(), CoreError> {
        lock(&self.staged).remove(&staged.id);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), CoreError> {
        lock(&self.removed).push(path.to_string());
        Ok(())
    }
}
