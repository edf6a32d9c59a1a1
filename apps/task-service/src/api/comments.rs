use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use core_lib::auth::AuthenticatedUser;

use crate::domain::{CommentRow, NewComment, TaskRow};
use crate::notifications::resolver::{self, CommentContext};
use crate::{AppState, map_core_error};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CommentRow> for CommentView {
    fn from(comment: &CommentRow) -> Self {
        CommentView {
            id: comment.id,
            task_id: comment.task_id,
            author_id: comment.author_id,
            content: comment.content.clone(),
            parent_comment_id: comment.parent_comment_id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// Load a task, hiding it from callers outside its organization.
async fn visible_task(
    state: &AppState,
    principal: &AuthenticatedUser,
    task_id: Uuid,
) -> Result<TaskRow, StatusCode> {
    let Some(task) = state.tasks.get(task_id).await.map_err(map_core_error)? else {
        return Err(StatusCode::NOT_FOUND);
    };
    if !principal.organizations.contains(&task.organization_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(task)
}

// POST /api/tasks/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if body.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let task = visible_task(&state, &principal, task_id).await?;

    // A reply must point at a comment on the same task.
    let parent_author_id = match body.parent_comment_id {
        Some(parent_id) => {
            let Some(parent) = state.comments.get(parent_id).await.map_err(map_core_error)?
            else {
                return Err(StatusCode::BAD_REQUEST);
            };
            if parent.task_id != task.id {
                return Err(StatusCode::BAD_REQUEST);
            }
            Some(parent.author_id)
        }
        None => None,
    };

    let comment = state
        .comments
        .create(&NewComment {
            task_id: task.id,
            author_id: principal.user_id,
            content: body.content,
            parent_comment_id: body.parent_comment_id,
        })
        .await
        .map_err(map_core_error)?;

    let ctx = CommentContext {
        organization_id: task.organization_id,
        task: &task,
        comment: &comment,
        parent_author_id,
        author: principal.user_ref(),
    };
    let plan = resolver::plan_comment_created(state.directory.as_ref(), &ctx).await;
    if let Err(e) = state.publisher.publish_comment_created(
        task.organization_id,
        principal.user_id,
        plan.created_recipients,
        plan.payload.clone(),
    ) {
        warn!("Failed to enqueue comment.created event: {}", e);
    }
    if let Err(e) = state.publisher.publish_comment_mention(
        task.organization_id,
        principal.user_id,
        plan.mention_recipients,
        plan.payload,
    ) {
        warn!("Failed to enqueue comment.mentioned event: {}", e);
    }

    Ok((StatusCode::CREATED, Json(CommentView::from(&comment))))
}

// PATCH /api/comments/{id}
pub async fn update_comment(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if body.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let Some(existing) = state.comments.get(id).await.map_err(map_core_error)? else {
        return Err(StatusCode::NOT_FOUND);
    };
    let task = visible_task(&state, &principal, existing.task_id).await?;
    if existing.author_id != principal.user_id {
        return Err(StatusCode::FORBIDDEN);
    }

    let previous_content = existing.content;
    let Some(comment) = state
        .comments
        .update_content(id, &body.content)
        .await
        .map_err(map_core_error)?
    else {
        return Err(StatusCode::NOT_FOUND);
    };

    let ctx = CommentContext {
        organization_id: task.organization_id,
        task: &task,
        comment: &comment,
        parent_author_id: None,
        author: principal.user_ref(),
    };
    let plan = resolver::plan_comment_update(state.directory.as_ref(), &ctx, &previous_content).await;
    if let Err(e) = state.publisher.publish_comment_updated(
        task.organization_id,
        principal.user_id,
        plan.recipients,
        plan.payload,
    ) {
        warn!("Failed to enqueue comment.updated event: {}", e);
    }

    Ok((StatusCode::OK, Json(CommentView::from(&comment))))
}

// DELETE /api/comments/{id}
//
// Deleting a comment produces no notifications; the deleted event contract
// exists for other producers but nothing here has an audience for it.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let Some(existing) = state.comments.get(id).await.map_err(map_core_error)? else {
        return Err(StatusCode::NOT_FOUND);
    };
    let _task = visible_task(&state, &principal, existing.task_id).await?;
    if existing.author_id != principal.user_id {
        return Err(StatusCode::FORBIDDEN);
    }

    state.comments.delete(id).await.map_err(map_core_error)?;
    Ok(StatusCode::NO_CONTENT)
}
