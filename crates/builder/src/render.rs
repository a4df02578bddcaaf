//! Page projection: query the posts tables and serialize a JSON artifact
//! per build target.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use sumi_core::build::BuildTarget;
use sumi_core::error::CoreError;
use sumi_core::ports::PageRenderer;
use sumi_core::types::{DbId, Timestamp};
use sumi_db::models::post::{PostFileRow, PostRow};
use sumi_db::repositories::PostRepo;
use sumi_db::DbPool;

fn storage_err(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("storage error: {e}"))
}

// ---------------------------------------------------------------------------
// Projection types
// ---------------------------------------------------------------------------

/// One attachment, as exposed on a rendered page. The submitter's IP is
/// never part of any projection.
#[derive(Debug, Serialize)]
struct FileView {
    name: String,
    path: String,
    thumb_path: Option<String>,
    width: i32,
    height: i32,
    size: i64,
}

impl From<PostFileRow> for FileView {
    fn from(row: PostFileRow) -> Self {
        FileView {
            name: row.name,
            path: row.path,
            thumb_path: row.thumb_path,
            width: row.width,
            height: row.height,
            size: row.size,
        }
    }
}

#[derive(Debug, Serialize)]
struct PostView {
    id: DbId,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<DbId>,
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    subject: String,
    body: String,
    time: Timestamp,
    files: Vec<FileView>,
}

impl PostView {
    fn new(row: PostRow, files: Vec<FileView>) -> Self {
        PostView {
            id: row.id,
            thread: row.thread,
            name: row.name,
            subject: row.subject,
            body: row.body,
            time: row.time,
            files,
        }
    }
}

#[derive(Debug, Serialize)]
struct ThreadPage {
    board: String,
    thread: DbId,
    posts: Vec<PostView>,
}

#[derive(Debug, Serialize)]
struct ThreadSummary {
    op: PostView,
    sticky: bool,
    locked: bool,
    reply_count: i64,
    image_count: i64,
}

#[derive(Debug, Serialize)]
struct IndexPageView {
    board: String,
    page: u32,
    threads: Vec<ThreadSummary>,
}

#[derive(Debug, Serialize)]
struct CatalogView {
    board: String,
    threads: Vec<ThreadSummary>,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders build targets into JSON artifacts straight from Postgres.
///
/// Rendering is a pure read; re-rendering an unchanged page produces the
/// same bytes, which keeps duplicate queue entries harmless.
#[derive(Clone)]
pub struct JsonPageRenderer {
    pool: DbPool,
}

impl JsonPageRenderer {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn render_thread(&self, board: &str, thread: DbId) -> Result<Vec<u8>, CoreError> {
        let rows = PostRepo::thread_posts(&self.pool, board, thread)
            .await
            .map_err(storage_err)?;
        if rows.is_empty() {
            return Err(CoreError::NotFound { entity: "thread", id: thread });
        }
        let posts = self
            .attach_files(board, rows)
            .await?
            .into_iter()
            .map(|(_, view)| view)
            .collect();
        encode(&ThreadPage { board: board.to_string(), thread, posts })
    }

    async fn render_index(&self, board: &str, page: u32) -> Result<Vec<u8>, CoreError> {
        let ops = PostRepo::page_ops(&self.pool, board, page)
            .await
            .map_err(storage_err)?;
        let threads = self.summarize(board, ops).await?;
        encode(&IndexPageView { board: board.to_string(), page, threads })
    }

    async fn render_catalog(&self, board: &str) -> Result<Vec<u8>, CoreError> {
        let ops = PostRepo::board_ops(&self.pool, board)
            .await
            .map_err(storage_err)?;
        let threads = self.summarize(board, ops).await?;
        encode(&CatalogView { board: board.to_string(), threads })
    }

    async fn summarize(
        &self,
        board: &str,
        ops: Vec<PostRow>,
    ) -> Result<Vec<ThreadSummary>, CoreError> {
        let mut threads = Vec::with_capacity(ops.len());
        for (row, view) in self.attach_files(board, ops).await? {
            let meta = PostRepo::thread_meta(&self.pool, board, row.id)
                .await
                .map_err(storage_err)?;
            let (reply_count, image_count) = meta
                .map(|m| (m.reply_count, m.image_count))
                .unwrap_or((0, 0));
            threads.push(ThreadSummary {
                op: view,
                sticky: row.sticky,
                locked: row.locked,
                reply_count,
                image_count,
            });
        }
        Ok(threads)
    }

    async fn attach_files(
        &self,
        board: &str,
        rows: Vec<PostRow>,
    ) -> Result<Vec<(PostRow, PostView)>, CoreError> {
        let ids: Vec<DbId> = rows.iter().map(|r| r.id).collect();
        let mut by_post: HashMap<DbId, Vec<FileView>> = HashMap::new();
        for file in PostRepo::files_for_posts(&self.pool, board, &ids)
            .await
            .map_err(storage_err)?
        {
            by_post.entry(file.post_id).or_default().push(file.into());
        }
        Ok(rows
            .into_iter()
            .map(|row| {
                let files = by_post.remove(&row.id).unwrap_or_default();
                let view = PostView::new(row.clone(), files);
                (row, view)
            })
            .collect())
    }
}

fn encode<T: Serialize>(view: &T) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(view).map_err(|e| CoreError::Build(format!("page encoding failed: {e}")))
}

#[async_trait]
impl PageRenderer for JsonPageRenderer {
    async fn render(&self, target: &BuildTarget) -> Result<Vec<u8>, CoreError> {
        match target {
            BuildTarget::Thread { board, thread } => self.render_thread(board, *thread).await,
            BuildTarget::IndexPage { board, page } => self.render_index(board, *page).await,
            BuildTarget::Catalog { board } => self.render_catalog(board).await,
        }
    }
}
