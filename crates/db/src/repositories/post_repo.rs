//! Repository for the `posts` and `post_files` tables.
//!
//! Post ids are board-scoped and drawn from `boards.post_counter` inside
//! the insert transaction, so concurrent submissions to the same board
//! serialize on the counter row.

use sqlx::PgPool;
use sumi_core::capacity::{check_hard_limits, HardLimits};
use sumi_core::error::CoreError;
use sumi_core::models::{NewPost, ThreadFlags, ThreadMeta};
use sumi_core::types::{DbId, Timestamp};

use crate::models::post::{PostFileRow, PostRow, ThreadMetaRow};

/// Outcome of an insert attempt: committed, or rolled back by a domain
/// check that ran inside the transaction.
pub enum PostInsert {
    Committed(DbId),
    Rejected(CoreError),
}

/// Column list for `posts` queries.
const COLUMNS: &str = "board, id, thread, name, email, subject, body, ip, time, bump, \
                       sticky, locked, sage, cycle, num_files";

/// Column list for `post_files` queries.
const FILE_COLUMNS: &str = "board, post_id, idx, name, path, thumb_path, width, height, size";

/// Threads shown per index page.
pub const THREADS_PER_PAGE: i64 = 10;

pub struct PostRepo;

impl PostRepo {
    /// Insert a post and its files, allocating the next board-scoped id.
    ///
    /// New threads get `bump` initialized to the post time; replies leave
    /// bumping to [`PostRepo::bump_thread`]. For replies the OP row is
    /// locked `FOR UPDATE` and the hard limits re-checked against counts
    /// taken under that lock, so concurrent replies to a nearly-full
    /// thread serialize instead of both slipping past the cap.
    pub async fn insert(
        pool: &PgPool,
        post: &NewPost,
        limits: HardLimits,
    ) -> Result<PostInsert, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (id,): (DbId,) = sqlx::query_as(
            "UPDATE boards SET post_counter = post_counter + 1 \
             WHERE uri = $1 RETURNING post_counter",
        )
        .bind(&post.board)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(thread) = post.thread {
            let op: Option<(bool, bool, bool, bool)> = sqlx::query_as(
                "SELECT sticky, locked, sage, cycle FROM posts \
                 WHERE board = $1 AND id = $2 AND thread IS NULL FOR UPDATE",
            )
            .bind(&post.board)
            .bind(thread)
            .fetch_optional(&mut *tx)
            .await?;
            let Some((sticky, locked, sage, cycle)) = op else {
                return Ok(PostInsert::Rejected(CoreError::NotFound {
                    entity: "thread",
                    id: thread,
                }));
            };
            let (reply_count, image_count): (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE num_files > 0) \
                 FROM posts WHERE board = $1 AND thread = $2",
            )
            .bind(&post.board)
            .bind(thread)
            .fetch_one(&mut *tx)
            .await?;
            let meta = ThreadMeta {
                board: post.board.clone(),
                id: thread,
                reply_count,
                image_count,
                flags: ThreadFlags { sticky, locked, sage, cycle },
            };
            if let Err(e) = check_hard_limits(&meta, !post.files.is_empty(), limits) {
                // Dropping the transaction rolls the counter back too.
                return Ok(PostInsert::Rejected(e));
            }
        }

        let bump: Option<Timestamp> = post.thread.is_none().then_some(post.time);

        sqlx::query(
            "INSERT INTO posts \
             (board, id, thread, name, email, subject, body, ip, time, bump, num_files) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&post.board)
        .bind(id)
        .bind(post.thread)
        .bind(&post.name)
        .bind(&post.email)
        .bind(&post.subject)
        .bind(&post.body)
        .bind(&post.ip)
        .bind(post.time)
        .bind(bump)
        .bind(post.files.len() as i32)
        .execute(&mut *tx)
        .await?;

        for (idx, file) in post.files.iter().enumerate() {
            sqlx::query(&format!(
                "INSERT INTO post_files ({FILE_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(&post.board)
            .bind(id)
            .bind(idx as i32)
            .bind(&file.name)
            .bind(&file.path)
            .bind(&file.thumb_path)
            .bind(file.width as i32)
            .bind(file.height as i32)
            .bind(file.size as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(PostInsert::Committed(id))
    }

    /// OP flags plus reply/image counters for one thread. `None` when the
    /// id does not name a thread OP on this board.
    pub async fn thread_meta(
        pool: &PgPool,
        board: &str,
        thread: DbId,
    ) -> Result<Option<ThreadMetaRow>, sqlx::Error> {
        sqlx::query_as::<_, ThreadMetaRow>(
            "SELECT op.board, op.id, op.sticky, op.locked, op.sage, op.cycle, \
                    COUNT(r.id) AS reply_count, \
                    COUNT(r.id) FILTER (WHERE r.num_files > 0) AS image_count \
             FROM posts op \
             LEFT JOIN posts r ON r.board = op.board AND r.thread = op.id \
             WHERE op.board = $1 AND op.id = $2 AND op.thread IS NULL \
             GROUP BY op.board, op.id, op.sticky, op.locked, op.sage, op.cycle",
        )
        .bind(board)
        .bind(thread)
        .fetch_optional(pool)
        .await
    }

    /// Ids of all replies in a thread.
    pub async fn reply_ids(
        pool: &PgPool,
        board: &str,
        thread: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> =
            sqlx::query_as("SELECT id FROM posts WHERE board = $1 AND thread = $2")
                .bind(board)
                .bind(thread)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete posts by id, returning the file rows that went with them
    /// (rows cascade; stored artifacts are the caller's cleanup).
    pub async fn delete(
        pool: &PgPool,
        board: &str,
        ids: &[DbId],
    ) -> Result<Vec<PostFileRow>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = pool.begin().await?;

        let files = sqlx::query_as::<_, PostFileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM post_files \
             WHERE board = $1 AND post_id = ANY($2)"
        ))
        .bind(board)
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM posts WHERE board = $1 AND id = ANY($2)")
            .bind(board)
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(files)
    }

    /// Move a thread to the top of the index.
    pub async fn bump(pool: &PgPool, board: &str, thread: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE posts SET bump = NOW() \
             WHERE board = $1 AND id = $2 AND thread IS NULL",
        )
        .bind(board)
        .bind(thread)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// OP plus every reply of one thread, in posting order.
    pub async fn thread_posts(
        pool: &PgPool,
        board: &str,
        thread: DbId,
    ) -> Result<Vec<PostRow>, sqlx::Error> {
        sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {COLUMNS} FROM posts \
             WHERE board = $1 AND (id = $2 AND thread IS NULL OR thread = $2) \
             ORDER BY id ASC"
        ))
        .bind(board)
        .bind(thread)
        .fetch_all(pool)
        .await
    }

    /// Thread OPs for one index page: stickies first, then bump order.
    pub async fn page_ops(
        pool: &PgPool,
        board: &str,
        page: u32,
    ) -> Result<Vec<PostRow>, sqlx::Error> {
        let offset = i64::from(page.saturating_sub(1)) * THREADS_PER_PAGE;
        sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {COLUMNS} FROM posts \
             WHERE board = $1 AND thread IS NULL \
             ORDER BY sticky DESC, bump DESC NULLS LAST, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(board)
        .bind(THREADS_PER_PAGE)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Every thread OP on the board, for the catalog.
    pub async fn board_ops(pool: &PgPool, board: &str) -> Result<Vec<PostRow>, sqlx::Error> {
        sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {COLUMNS} FROM posts \
             WHERE board = $1 AND thread IS NULL \
             ORDER BY sticky DESC, bump DESC NULLS LAST, id DESC"
        ))
        .bind(board)
        .fetch_all(pool)
        .await
    }

    /// File rows for a set of posts, in attachment order.
    pub async fn files_for_posts(
        pool: &PgPool,
        board: &str,
        ids: &[DbId],
    ) -> Result<Vec<PostFileRow>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, PostFileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM post_files \
             WHERE board = $1 AND post_id = ANY($2) \
             ORDER BY post_id ASC, idx ASC"
        ))
        .bind(board)
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Number of index pages the board spans, at least 1.
    pub async fn page_count(pool: &PgPool, board: &str) -> Result<u32, sqlx::Error> {
        let (threads,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posts WHERE board = $1 AND thread IS NULL",
        )
        .bind(board)
        .fetch_one(pool)
        .await?;
        Ok(((threads + THREADS_PER_PAGE - 1) / THREADS_PER_PAGE).max(1) as u32)
    }
}
