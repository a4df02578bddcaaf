//! Shared SHA-256 hex digest utility.
//!
//! Used for content fingerprints and flood scope keys. These digests are
//! identifiers, not security primitives.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute a SHA-256 hex digest over several segments in order.
///
/// Equivalent to hashing the concatenation of the segments; the split
/// points do not influence the digest.
pub fn sha256_hex_concat<S: AsRef<[u8]>>(segments: &[S]) -> String {
    let mut hasher = Sha256::new();
    for segment in segments {
        hasher.update(segment.as_ref());
    }
    format!("{:x}", hasher.finalize())
}
