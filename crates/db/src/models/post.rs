//! Row types for the `posts` and `post_files` tables.

use sqlx::FromRow;
use sumi_core::models::{PostFile, ThreadFlags, ThreadMeta};
use sumi_core::types::{DbId, Timestamp};

/// A row from the `posts` table.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub board: String,
    pub id: DbId,
    pub thread: Option<DbId>,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub ip: String,
    pub time: Timestamp,
    pub bump: Option<Timestamp>,
    pub sticky: bool,
    pub locked: bool,
    pub sage: bool,
    pub cycle: bool,
    pub num_files: i32,
}

/// OP row joined with its reply counters, as selected by
/// `PostRepo::thread_meta`.
#[derive(Debug, Clone, FromRow)]
pub struct ThreadMetaRow {
    pub board: String,
    pub id: DbId,
    pub sticky: bool,
    pub locked: bool,
    pub sage: bool,
    pub cycle: bool,
    pub reply_count: i64,
    pub image_count: i64,
}

impl From<ThreadMetaRow> for ThreadMeta {
    fn from(row: ThreadMetaRow) -> Self {
        ThreadMeta {
            board: row.board,
            id: row.id,
            reply_count: row.reply_count,
            image_count: row.image_count,
            flags: ThreadFlags {
                sticky: row.sticky,
                locked: row.locked,
                sage: row.sage,
                cycle: row.cycle,
            },
        }
    }
}

/// A row from the `post_files` table.
#[derive(Debug, Clone, FromRow)]
pub struct PostFileRow {
    pub board: String,
    pub post_id: DbId,
    pub idx: i32,
    pub name: String,
    pub path: String,
    pub thumb_path: Option<String>,
    pub width: i32,
    pub height: i32,
    pub size: i64,
}

impl From<PostFileRow> for PostFile {
    fn from(row: PostFileRow) -> Self {
        PostFile {
            name: row.name,
            path: row.path,
            thumb_path: row.thumb_path,
            width: row.width.max(0) as u32,
            height: row.height.max(0) as u32,
            size: row.size.max(0) as u64,
        }
    }
}
