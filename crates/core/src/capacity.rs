//! Thread capacity rules: hard reply/image limits, bump eligibility, and
//! cyclical-thread eviction.
//!
//! Pure functions over a [`ThreadMeta`] snapshot; the pipeline applies the
//! results through the post store.

use crate::error::CoreError;
use crate::models::ThreadMeta;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of retained replies in a cyclical thread.
pub const DEFAULT_CYCLE_KEEP: usize = 50;

/// Email field value that suppresses bumping, compared case-insensitively.
pub const SAGE_EMAIL: &str = "sage";

// ---------------------------------------------------------------------------
// Hard limits
// ---------------------------------------------------------------------------

/// Maximum reply and image counts for a thread. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardLimits {
    pub replies: u32,
    pub images: u32,
}

/// Refuse a reply outright once the thread is at capacity.
///
/// Counts in `meta` are taken before the candidate reply is inserted, so
/// a thread holding exactly `replies` replies denies the next one. The
/// image limit only applies to replies that carry a file.
pub fn check_hard_limits(
    meta: &ThreadMeta,
    has_image: bool,
    limits: HardLimits,
) -> Result<(), CoreError> {
    if limits.replies != 0 && meta.reply_count >= i64::from(limits.replies) {
        return Err(CoreError::Validation(
            "Thread has reached its maximum reply limit.".to_string(),
        ));
    }
    if has_image && limits.images != 0 && meta.image_count >= i64::from(limits.images) {
        return Err(CoreError::Validation(
            "Thread has reached its maximum image limit.".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bump eligibility
// ---------------------------------------------------------------------------

/// Decide whether an accepted reply bumps its thread.
///
/// `reply_count_before_insert` excludes the reply being committed. The
/// reply that brings the thread exactly to `reply_limit` still bumps; the
/// one after does not (and is normally already denied by the hard limit
/// when the hard limit equals the reply limit).
pub fn should_bump(
    email: &str,
    meta: &ThreadMeta,
    reply_count_before_insert: i64,
    reply_limit: u32,
) -> bool {
    if email.eq_ignore_ascii_case(SAGE_EMAIL) {
        return false;
    }
    if meta.flags.sage {
        return false;
    }
    reply_limit == 0 || reply_count_before_insert < i64::from(reply_limit)
}

// ---------------------------------------------------------------------------
// Cyclical eviction
// ---------------------------------------------------------------------------

/// Select the replies to evict from a cyclical thread.
///
/// `reply_ids` are the ids of all replies currently in the thread (the OP
/// is never a candidate). Keeps the `keep` highest ids and returns the
/// rest, oldest first. Returns an empty vector when the thread is already
/// within bounds, so the caller may invoke this unconditionally after
/// every committed reply.
pub fn cyclical_evictions(reply_ids: &[DbId], keep: usize) -> Vec<DbId> {
    if reply_ids.len() <= keep {
        return Vec::new();
    }
    let mut sorted = reply_ids.to_vec();
    sorted.sort_unstable();
    sorted.truncate(sorted.len() - keep);
    sorted
}
