//! Repository for the `flood_entries` table.
//!
//! Append-mostly; each board's rows are purged once older than that
//! board's widest configured flood window. The count-then-append race across two submissions is a
//! documented flood-control miss, not a correctness bug.

use sqlx::PgPool;
use sumi_core::models::FloodEntry;
use sumi_core::types::Timestamp;

pub struct FloodRepo;

impl FloodRepo {
    pub async fn append(pool: &PgPool, entry: &FloodEntry) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO flood_entries (scope_key, board, time) VALUES ($1, $2, $3)")
            .bind(&entry.scope_key)
            .bind(&entry.board)
            .bind(entry.time)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn count_since(
        pool: &PgPool,
        scope_key: &str,
        board: &str,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM flood_entries \
             WHERE scope_key = $1 AND board = $2 AND time >= $3",
        )
        .bind(scope_key)
        .bind(board)
        .bind(cutoff)
        .fetch_one(pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn purge_older_than(
        pool: &PgPool,
        board: &str,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM flood_entries WHERE board = $1 AND time < $2")
            .bind(board)
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
