//! Row type for the `bans` table.

use sqlx::FromRow;
use sumi_core::models::ActiveBan;
use sumi_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow)]
pub struct BanRow {
    pub id: DbId,
    pub ip: String,
    pub reason: String,
    pub created: Timestamp,
    pub expires: Option<Timestamp>,
}

impl From<BanRow> for ActiveBan {
    fn from(row: BanRow) -> Self {
        ActiveBan {
            id: row.id,
            reason: row.reason,
            expires: row.expires,
        }
    }
}
