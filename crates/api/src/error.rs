use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use sumi_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A domain-level error from `sumi_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A board that this instance does not serve.
    #[error("Board not found: {0}")]
    UnknownBoard(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, extra) = match &self {
            ApiError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                    None,
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
                }
                CoreError::RateLimited(msg) => {
                    (StatusCode::TOO_MANY_REQUESTS, "FLOOD", msg.clone(), None)
                }
                CoreError::Banned { reason, until } => (
                    StatusCode::FORBIDDEN,
                    "BANNED",
                    reason.clone(),
                    Some(json!({ "until": until })),
                ),
                CoreError::Duplicate { message, original } => (
                    StatusCode::CONFLICT,
                    "DUPLICATE",
                    message.clone(),
                    Some(json!({
                        "original": {
                            "board": original.board,
                            "thread": original.thread,
                            "post": original.post,
                        }
                    })),
                ),
                CoreError::Resource(msg) => {
                    (StatusCode::BAD_REQUEST, "UPLOAD_REJECTED", msg.clone(), None)
                }
                CoreError::RemoteService(msg) => {
                    tracing::warn!(error = %msg, "Remote service failure");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "REMOTE_SERVICE",
                        "A required external service did not respond".to_string(),
                        None,
                    )
                }
                CoreError::Build(msg) | CoreError::Config(msg) | CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },
            ApiError::UnknownBoard(board) => (
                StatusCode::NOT_FOUND,
                "BOARD_NOT_FOUND",
                format!("No such board: {board}"),
                None,
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra) {
            if let Some(extra) = extra.as_object() {
                for (k, v) in extra {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }

        (status, axum::Json(body)).into_response()
    }
}
