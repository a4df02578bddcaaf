use std::sync::Arc;

use sumi_pipeline::dispatch::BuildDispatcher;
use sumi_pipeline::submit::SubmissionPipeline;

use crate::boards::BoardRegistry;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub dispatcher: Arc<BuildDispatcher>,
    pub boards: Arc<BoardRegistry>,
    pub config: Arc<ServerConfig>,
}
