//! Post submission: one multipart endpoint.

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use validator::Validate;

use sumi_core::models::{FileUpload, PostCandidate};
use sumi_pipeline::submit::SubmitRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/boards/{board}/posts", post(create_post))
}

/// Coarse transport-level caps; per-board limits are enforced again in
/// the pipeline.
#[derive(Debug, Default, Validate)]
struct SubmitForm {
    #[validate(length(max = 100))]
    name: String,
    #[validate(length(max = 100))]
    email: String,
    #[validate(length(max = 150))]
    subject: String,
    #[validate(length(max = 32_000))]
    body: String,
    #[validate(range(min = 1))]
    thread: Option<i64>,
    captcha: Option<String>,
    file_url: Option<String>,
}

async fn create_post(
    State(state): State<AppState>,
    Path(board): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let cfg = state
        .boards
        .get(&board)
        .ok_or_else(|| ApiError::UnknownBoard(board.clone()))?;

    let mut form = SubmitForm::default();
    let mut files: Vec<FileUpload> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => form.name = text(field).await?,
            "email" => form.email = text(field).await?,
            "subject" => form.subject = text(field).await?,
            "body" => form.body = text(field).await?,
            "thread" => {
                let value = text(field).await?;
                if !value.is_empty() {
                    form.thread = Some(value.parse().map_err(|_| {
                        ApiError::BadRequest("thread must be a post id".to_string())
                    })?);
                }
            }
            "captcha" => form.captcha = Some(text(field).await?).filter(|s| !s.is_empty()),
            "file_url" => {
                form.file_url = Some(text(field).await?).filter(|s| !s.is_empty())
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("upload read failed: {e}")))?;
                files.push(FileUpload { name: file_name, mime, data: data.to_vec() });
            }
            // Unknown fields are drained and ignored.
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    form.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let candidate = PostCandidate {
        board,
        thread: form.thread,
        ip: client_ip(&headers),
        name: form.name,
        email: form.email,
        subject: form.subject,
        body: form.body,
        files,
        moderator: false,
    };
    let request = SubmitRequest {
        candidate,
        captcha_token: form.captcha,
        file_url: form.file_url,
    };

    let result = state.pipeline.submit(cfg, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "post_id": result.post_id,
            "thread_id": result.thread_id,
            "redirect": result.redirect.artifact_key(),
        })),
    ))
}

async fn text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("field read failed: {e}")))
}

/// Submitter address: first hop of `X-Forwarded-For` when present, since
/// the server is expected to sit behind a reverse proxy.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
