//! Page reads, including the on-access rebuild path.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use sumi_core::build::BuildTarget;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/boards/{board}/threads/{thread}", get(thread_page))
        .route("/boards/{board}/pages/{page}", get(index_page))
        .route("/boards/{board}/catalog", get(catalog_page))
}

async fn thread_page(
    State(state): State<AppState>,
    Path((board, thread)): Path<(String, i64)>,
) -> ApiResult<impl IntoResponse> {
    serve(&state, BuildTarget::Thread { board, thread }).await
}

async fn index_page(
    State(state): State<AppState>,
    Path((board, page)): Path<(String, u32)>,
) -> ApiResult<impl IntoResponse> {
    serve(&state, BuildTarget::IndexPage { board, page }).await
}

async fn catalog_page(
    State(state): State<AppState>,
    Path(board): Path<String>,
) -> ApiResult<impl IntoResponse> {
    serve(&state, BuildTarget::Catalog { board }).await
}

async fn serve(state: &AppState, target: BuildTarget) -> ApiResult<impl IntoResponse> {
    if state.boards.get(target.board()).is_none() {
        return Err(ApiError::UnknownBoard(target.board().to_string()));
    }
    let bytes = state.dispatcher.serve(&target).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}
