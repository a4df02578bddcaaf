//! Per-board submission settings.

use std::time::Duration;

use sumi_core::capacity::{HardLimits, DEFAULT_CYCLE_KEEP};
use sumi_core::filters::FilterRule;
use sumi_core::fingerprint::DedupScope;

/// Everything the pipeline needs to know about one board.
///
/// Field length caps are measured in characters, not bytes.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Ordered abuse rules; first full match wins.
    pub filters: Vec<FilterRule>,
    /// `None` disables duplicate-upload detection.
    pub dedup: Option<DedupScope>,
    /// Hard reply/image caps; zero means unlimited.
    pub hard_limits: HardLimits,
    /// Replies past this count no longer bump the thread. Zero disables.
    pub reply_limit: u32,
    /// Replies retained in a cyclical thread.
    pub cycle_keep: usize,
    /// Maximum uploads per post.
    pub max_files: usize,
    pub max_body_len: usize,
    pub max_name_len: usize,
    pub max_email_len: usize,
    pub max_subject_len: usize,
    pub require_captcha: bool,
    pub check_dnsbl: bool,
    /// Bound on every out-of-process call (CAPTCHA, DNSBL, URL fetch,
    /// media processing).
    pub remote_timeout: Duration,
    /// Thumbnail bounding box.
    pub thumb_max_width: u32,
    pub thumb_max_height: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            dedup: None,
            hard_limits: HardLimits::default(),
            reply_limit: 250,
            cycle_keep: DEFAULT_CYCLE_KEEP,
            max_files: 4,
            max_body_len: 16_000,
            max_name_len: 50,
            max_email_len: 50,
            max_subject_len: 100,
            require_captcha: false,
            check_dnsbl: false,
            remote_timeout: Duration::from_secs(5),
            thumb_max_width: 255,
            thumb_max_height: 255,
        }
    }
}
