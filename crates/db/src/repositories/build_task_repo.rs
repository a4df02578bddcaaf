//! Repository for the `build_tasks` table.
//!
//! `claim_next` uses `SELECT FOR UPDATE SKIP LOCKED` so several builder
//! processes can drain the queue without double-claiming a task.

use sqlx::PgPool;
use sumi_core::build::{BuildTarget, TaskStatus};
use sumi_core::types::DbId;

use crate::models::build_task::BuildTaskRow;

const COLUMNS: &str = "id, target, status_id, error, created, claimed_at, completed_at";

pub struct BuildTaskRepo;

impl BuildTaskRepo {
    pub async fn enqueue(pool: &PgPool, target: &BuildTarget) -> Result<DbId, sqlx::Error> {
        let payload = serde_json::to_value(target)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let (id,): (DbId,) =
            sqlx::query_as("INSERT INTO build_tasks (target) VALUES ($1) RETURNING id")
                .bind(payload)
                .fetch_one(pool)
                .await?;
        Ok(id)
    }

    /// Atomically claim the oldest pending task, marking it running.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<BuildTaskRow>, sqlx::Error> {
        sqlx::query_as::<_, BuildTaskRow>(&format!(
            "UPDATE build_tasks \
             SET status_id = $1, claimed_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM build_tasks \
                 WHERE status_id = $2 \
                 ORDER BY created ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        ))
        .bind(TaskStatus::Running.id())
        .bind(TaskStatus::Pending.id())
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_done(pool: &PgPool, task: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE build_tasks SET status_id = $2, completed_at = NOW(), error = NULL \
             WHERE id = $1",
        )
        .bind(task)
        .bind(TaskStatus::Done.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(pool: &PgPool, task: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE build_tasks SET status_id = $2, completed_at = NOW(), error = $3 \
             WHERE id = $1",
        )
        .bind(task)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reset failed tasks to pending so the next drain retries them.
    pub async fn requeue_failed(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE build_tasks \
             SET status_id = $1, error = NULL, claimed_at = NULL, completed_at = NULL \
             WHERE status_id = $2",
        )
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
