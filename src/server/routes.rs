//! Router configuration for the Control API (§4.5, §6).

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Build the Control API router over the given shared state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/optimize", post(handlers::submit))
        .route("/optimize/sync", post(handlers::submit_sync))
        .route("/optimize/:task_id", get(handlers::get))
        .route("/knowledge-base/load", post(handlers::load_knowledge))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/tasks", get(handlers::list))
        .route("/tasks/:task_id/dataset", get(handlers::get_dataset))
        .route("/tasks/:task_id/resume", post(handlers::resume))
        .route("/tasks/:task_id", delete(handlers::delete))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
