use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use core_lib::auth::AuthenticatedUser;

use crate::store::normalize_pagination;
use crate::{AppState, map_core_error};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub unread_only: Option<bool>,
}

// GET /api/notifications?page&limit&unreadOnly
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, StatusCode> {
    let (page, limit) = normalize_pagination(params.page, params.limit);
    let result = state
        .store
        .list(
            principal.user_id,
            page,
            limit,
            params.unread_only.unwrap_or(false),
        )
        .await
        .map_err(map_core_error)?;

    let items: Vec<_> = result.items.iter().map(|row| row.view()).collect();
    Ok(Json(json!({
        "data": items,
        "pagination": {
            "page": result.page,
            "limit": result.limit,
            "total": result.total,
            "hasMore": result.has_more,
        }
    })))
}

// GET /api/notifications/unread/count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let count = state
        .store
        .unread_count(principal.user_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(json!({ "count": count })))
}

// PATCH /api/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let updated = state
        .store
        .mark_as_read(id, principal.user_id)
        .await
        .map_err(map_core_error)?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        // Rows owned by someone else look identical to missing rows.
        Err(StatusCode::NOT_FOUND)
    }
}

// POST /api/notifications/mark-all-read
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let count = state
        .store
        .mark_all_as_read(principal.user_id)
        .await
        .map_err(map_core_error)?;
    Ok(Json(json!({ "count": count })))
}

// DELETE /api/notifications/{id}
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let deleted = state
        .store
        .delete(id, principal.user_id)
        .await
        .map_err(map_core_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
