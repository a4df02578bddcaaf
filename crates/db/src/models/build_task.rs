//! Row type for the `build_tasks` table.

use sqlx::FromRow;
use sumi_core::build::{BuildTask, BuildTarget, TaskStatus};
use sumi_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow)]
pub struct BuildTaskRow {
    pub id: DbId,
    pub target: serde_json::Value,
    pub status_id: i16,
    pub error: Option<String>,
    pub created: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl BuildTaskRow {
    /// Decode into the domain task. Fails when the stored target payload
    /// or status id is unreadable, which indicates a schema mismatch.
    pub fn into_task(self) -> Result<BuildTask, String> {
        let target: BuildTarget = serde_json::from_value(self.target)
            .map_err(|e| format!("undecodable build target for task {}: {e}", self.id))?;
        let status = TaskStatus::from_id(self.status_id)
            .ok_or_else(|| format!("unknown status id {} for task {}", self.status_id, self.id))?;
        Ok(BuildTask {
            id: self.id,
            target,
            status,
            error: self.error,
            created: self.created,
        })
    }
}
