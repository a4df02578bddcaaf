pub mod health;
pub mod pages;
pub mod posts;

use axum::Router;

use crate::state::AppState;

/// All versioned API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(posts::router()).merge(pages::router())
}
