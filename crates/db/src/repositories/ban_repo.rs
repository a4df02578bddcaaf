//! Repository for the `bans` table.

use sqlx::PgPool;
use sumi_core::models::NewBan;
use sumi_core::types::{DbId, Timestamp};

use crate::models::ban::BanRow;

const COLUMNS: &str = "id, ip, reason, created, expires";

pub struct BanRepo;

impl BanRepo {
    pub async fn create(pool: &PgPool, ban: &NewBan) -> Result<DbId, sqlx::Error> {
        let (id,): (DbId,) = sqlx::query_as(
            "INSERT INTO bans (ip, reason, expires) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&ban.ip)
        .bind(&ban.reason)
        .bind(ban.expires)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    /// Most recent ban for `ip` that is permanent or not yet expired.
    pub async fn active_for_ip(
        pool: &PgPool,
        ip: &str,
        now: Timestamp,
    ) -> Result<Option<BanRow>, sqlx::Error> {
        sqlx::query_as::<_, BanRow>(&format!(
            "SELECT {COLUMNS} FROM bans \
             WHERE ip = $1 AND (expires IS NULL OR expires > $2) \
             ORDER BY created DESC LIMIT 1"
        ))
        .bind(ip)
        .bind(now)
        .fetch_optional(pool)
        .await
    }
}
