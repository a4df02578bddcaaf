//! Repository for the `post_fingerprints` table.

use sqlx::PgPool;
use sumi_core::models::PostRef;
use sumi_core::types::DbId;

use crate::models::fingerprint::FingerprintRow;

const COLUMNS: &str = "hash, board, thread, post_id, created";

pub struct FingerprintRepo;

impl FingerprintRepo {
    /// Oldest recorded post with this hash, anywhere.
    pub async fn lookup_global(
        pool: &PgPool,
        hash: &str,
    ) -> Result<Option<FingerprintRow>, sqlx::Error> {
        sqlx::query_as::<_, FingerprintRow>(&format!(
            "SELECT {COLUMNS} FROM post_fingerprints \
             WHERE hash = $1 ORDER BY created ASC LIMIT 1"
        ))
        .bind(hash)
        .fetch_optional(pool)
        .await
    }

    /// Oldest recorded post with this hash inside one thread. Matches the
    /// OP itself as well as its replies.
    pub async fn lookup_in_thread(
        pool: &PgPool,
        hash: &str,
        board: &str,
        thread: DbId,
    ) -> Result<Option<FingerprintRow>, sqlx::Error> {
        sqlx::query_as::<_, FingerprintRow>(&format!(
            "SELECT {COLUMNS} FROM post_fingerprints \
             WHERE hash = $1 AND board = $2 AND (thread = $3 OR post_id = $3) \
             ORDER BY created ASC LIMIT 1"
        ))
        .bind(hash)
        .bind(board)
        .bind(thread)
        .fetch_optional(pool)
        .await
    }

    pub async fn record(pool: &PgPool, hash: &str, post: &PostRef) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO post_fingerprints (hash, board, thread, post_id) \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
        )
        .bind(hash)
        .bind(&post.board)
        .bind(post.thread)
        .bind(post.post)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Drop fingerprints owned by deleted posts.
    pub async fn forget(pool: &PgPool, board: &str, posts: &[DbId]) -> Result<(), sqlx::Error> {
        if posts.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM post_fingerprints WHERE board = $1 AND post_id = ANY($2)")
            .bind(board)
            .bind(posts)
            .execute(pool)
            .await?;
        Ok(())
    }
}
