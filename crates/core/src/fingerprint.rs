//! Content-addressed fingerprints for uploaded files.
//!
//! A fingerprint identifies file content for dedup purposes only; it is a
//! fast, collision-tolerant identifier, not a security primitive.

use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex;

/// Boundary within which duplicate content is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Reject a repost anywhere, across all boards and threads.
    Global,
    /// Reject a repost only inside the thread it is posted to.
    Thread,
}

/// Compute the fingerprint of an ordered set of uploads.
///
/// A single file hashes directly; multiple files hash the concatenation
/// of the per-file hex digests in upload order, so the same files in a
/// different order produce a different fingerprint. Returns `None` for an
/// empty set.
pub fn fingerprint_files<B: AsRef<[u8]>>(files: &[B]) -> Option<String> {
    match files {
        [] => None,
        [single] => Some(sha256_hex(single.as_ref())),
        many => {
            let combined: String = many
                .iter()
                .map(|f| sha256_hex(f.as_ref()))
                .collect::<Vec<_>>()
                .concat();
            Some(sha256_hex(combined.as_bytes()))
        }
    }
}
