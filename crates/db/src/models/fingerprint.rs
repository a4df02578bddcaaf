//! Row type for the `post_fingerprints` table.

use sqlx::FromRow;
use sumi_core::models::PostRef;
use sumi_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow)]
pub struct FingerprintRow {
    pub hash: String,
    pub board: String,
    pub thread: Option<DbId>,
    pub post_id: DbId,
    pub created: Timestamp,
}

impl From<FingerprintRow> for PostRef {
    fn from(row: FingerprintRow) -> Self {
        PostRef {
            board: row.board,
            thread: row.thread,
            post: row.post_id,
        }
    }
}
