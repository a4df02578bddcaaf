//! Domain types shared across the submission pipeline.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// A single uploaded file, still in memory, not yet staged anywhere.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Original client-supplied file name.
    pub name: String,
    /// Declared MIME type (advisory; the media processor re-probes).
    pub mime: String,
    pub data: Vec<u8>,
}

/// An untrusted submission as it enters the pipeline.
///
/// Transient: exists only while the submission is being processed.
#[derive(Debug, Clone)]
pub struct PostCandidate {
    pub board: String,
    /// `None` means the candidate opens a new thread.
    pub thread: Option<DbId>,
    pub ip: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    /// Upload order is significant: the combined fingerprint is
    /// order-sensitive.
    pub files: Vec<FileUpload>,
    /// Set by the caller after a capability check; exempts the candidate
    /// from filter rules and lock checks.
    pub moderator: bool,
}

impl PostCandidate {
    pub fn is_reply(&self) -> bool {
        self.thread.is_some()
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Reference to a committed post, e.g. the original of a duplicate upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub board: String,
    /// `None` for thread OPs.
    pub thread: Option<DbId>,
    pub post: DbId,
}

/// Moderation flags carried on a thread OP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadFlags {
    pub sticky: bool,
    pub locked: bool,
    /// Bumplocked: replies never bump, regardless of email field.
    pub sage: bool,
    /// Cyclical: oldest replies are evicted past the configured keep count.
    pub cycle: bool,
}

/// Snapshot of a thread's counters and flags at evaluation time.
///
/// `reply_count` and `image_count` are taken *before* the candidate reply
/// is inserted; capacity checks and bump eligibility are defined against
/// that pre-insert state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMeta {
    pub board: String,
    pub id: DbId,
    pub reply_count: i64,
    /// Number of replies carrying at least one file.
    pub image_count: i64,
    pub flags: ThreadFlags,
}

/// One row of the flood cache.
///
/// Appended for every committed post; read back by flood-match filter
/// conditions. Retained only up to the widest window across active rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodEntry {
    /// Hash of the concatenated field values the rule matches on.
    pub scope_key: String,
    pub board: String,
    pub time: Timestamp,
}

/// A new ban to persist, produced by a matching filter rule with a ban
/// action.
#[derive(Debug, Clone)]
pub struct NewBan {
    pub ip: String,
    pub reason: String,
    /// `None` means permanent.
    pub expires: Option<Timestamp>,
}

/// An active ban found for a submitter's IP.
#[derive(Debug, Clone)]
pub struct ActiveBan {
    pub id: DbId,
    pub reason: String,
    pub expires: Option<Timestamp>,
}

/// Metadata for one stored file of a committed post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostFile {
    pub name: String,
    pub path: String,
    pub thumb_path: Option<String>,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

/// A fully validated post ready for durable commit.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub board: String,
    /// `None` opens a new thread.
    pub thread: Option<DbId>,
    pub ip: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    /// Rendered HTML body.
    pub body: String,
    pub files: Vec<PostFile>,
    pub time: Timestamp,
}
