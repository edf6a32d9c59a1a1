use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use core_lib::{CoreError, UserDirectory};

// Declare modules
pub mod api;
pub mod config;
pub mod domain;
pub mod notifications;

pub use config::Config;
use domain::{CommentStore, TaskStore};
use notifications::NotificationPublisher;

/// Shared dependencies for the mutation handlers.
#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskStore,
    pub comments: CommentStore,
    pub publisher: NotificationPublisher,
    pub directory: Arc<dyn UserDirectory>,
    pub config: Arc<Config>,
}

/// Build the Axum router for the task/comment mutation surface.
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/tasks", post(api::tasks::create_task))
        .route(
            "/tasks/{id}",
            patch(api::tasks::update_task).delete(api::tasks::delete_task),
        )
        .route("/tasks/{id}/comments", post(api::comments::create_comment))
        .route(
            "/comments/{id}",
            patch(api::comments::update_comment).delete(api::comments::delete_comment),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::require_auth,
        ));

    Router::new()
        .nest("/api", protected)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "task-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Map store/domain errors onto HTTP status codes.
pub fn map_core_error(err: CoreError) -> StatusCode {
    error!("Request failed: {:?}", err);
    match err {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CoreError::Serialization(_)
        | CoreError::Deserialization(_)
        | CoreError::Infrastructure(_)
        | CoreError::Configuration(_)
        | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
