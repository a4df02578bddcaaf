use crate::models::PostRef;
use crate::types::{DbId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Flood detected: {0}")]
    RateLimited(String),

    #[error("Banned: {reason}")]
    Banned {
        reason: String,
        /// `None` means the ban is permanent.
        until: Option<Timestamp>,
    },

    #[error("Duplicate content: {message}")]
    Duplicate { message: String, original: PostRef },

    #[error("Upload failed: {0}")]
    Resource(String),

    #[error("Remote service failed: {0}")]
    RemoteService(String),

    #[error("Page build failed: {0}")]
    Build(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
