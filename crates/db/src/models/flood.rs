//! Row type for the `flood_entries` table.

use sqlx::FromRow;
use sumi_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow)]
pub struct FloodRow {
    pub id: DbId,
    pub scope_key: String,
    pub board: String,
    pub time: Timestamp,
}
