use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use core_lib::CoreError;

// Declare modules
pub mod api;
pub mod builder;
pub mod config;
pub mod consumer;
pub mod grpc;
pub mod store;
pub mod ws;

pub use config::Config;
use store::NotificationStore;
use ws::ConnectionHub;

/// Shared dependencies for HTTP handlers and the WebSocket endpoint.
#[derive(Clone)]
pub struct AppState {
    pub store: NotificationStore,
    pub hub: Arc<ConnectionHub>,
    pub config: Arc<Config>,
}

/// Build the Axum router: the query API under `/api/notifications`, the
/// WebSocket endpoint at `/api/ws`, and an unauthenticated health probe.
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/notifications", get(api::notifications::list_notifications))
        .route("/notifications/unread/count", get(api::notifications::unread_count))
        .route("/notifications/{id}/read", patch(api::notifications::mark_read))
        .route(
            "/notifications/mark-all-read",
            post(api::notifications::mark_all_read),
        )
        .route("/notifications/{id}", delete(api::notifications::delete_notification))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::middleware::require_auth,
        ));

    // The WebSocket handshake authenticates itself (header or query token).
    let api_routes = protected.route("/ws", get(ws::session::ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "notification-service",
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
