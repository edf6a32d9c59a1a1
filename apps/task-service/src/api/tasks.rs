use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use core_lib::auth::AuthenticatedUser;
use core_lib::events::{FieldChange, TaskPayload, UserRef};

use crate::domain::task::{DEFAULT_PRIORITY, DEFAULT_STATUS, PRIORITIES, STATUSES};
use crate::domain::{NewTask, TaskRow};
use crate::notifications::recipients;
use crate::{AppState, map_core_error};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Uuid,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TaskRow> for TaskView {
    fn from(task: &TaskRow) -> Self {
        TaskView {
            id: task.id,
            organization_id: task.organization_id,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status.clone(),
            priority: task.priority.clone(),
            assignee_id: task.assignee_id,
            reporter_id: task.reporter_id,
            due_at: task.due_at,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

pub(crate) fn task_payload(
    task: &TaskRow,
    trigger_user: UserRef,
    changes: Option<BTreeMap<String, FieldChange>>,
) -> TaskPayload {
    TaskPayload {
        task_id: task.id,
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status.clone(),
        priority: task.priority.clone(),
        assignee_id: task.assignee_id,
        reporter_id: Some(task.reporter_id),
        due_at: task.due_at,
        assignee: None,
        reporter: None,
        trigger_user: Some(trigger_user),
        changes,
    }
}

fn validate_status(status: &str) -> Result<(), StatusCode> {
    if STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

fn validate_priority(priority: &str) -> Result<(), StatusCode> {
    if PRIORITIES.contains(&priority) {
        Ok(())
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

fn render_optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if body.title.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !principal.organizations.contains(&body.organization_id) {
        return Err(StatusCode::FORBIDDEN);
    }
    let status = body.status.unwrap_or_else(|| DEFAULT_STATUS.to_string());
    let priority = body.priority.unwrap_or_else(|| DEFAULT_PRIORITY.to_string());
    validate_status(&status)?;
    validate_priority(&priority)?;

    let task = state
        .tasks
        .create(&NewTask {
            organization_id: body.organization_id,
            title: body.title,
            description: body.description,
            status,
            priority,
            assignee_id: body.assignee_id,
            reporter_id: principal.user_id,
            due_at: body.due_at,
        })
        .await
        .map_err(map_core_error)?;

    // Publishing happens after commit and never fails the request.
    let targets = recipients::task_created(
        task.assignee_id,
        Some(task.reporter_id),
        principal.user_id,
    );
    let payload = task_payload(&task, principal.user_ref(), None);
    if let Err(e) = state.publisher.publish_task_created(
        task.organization_id,
        principal.user_id,
        targets,
        payload,
    ) {
        warn!("Failed to enqueue task.created event: {}", e);
    }

    Ok((StatusCode::CREATED, Json(TaskView::from(&task))))
}

// PATCH /api/tasks/{id}
pub async fn update_task(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(mut task) = state.tasks.get(id).await.map_err(map_core_error)? else {
        return Err(StatusCode::NOT_FOUND);
    };
    // Tasks in organizations the caller is not part of stay invisible.
    if !principal.organizations.contains(&task.organization_id) {
        return Err(StatusCode::NOT_FOUND);
    }

    let mut changes: BTreeMap<String, FieldChange> = BTreeMap::new();
    let previous_assignee_id = task.assignee_id;

    if let Some(title) = body.title {
        if title.trim().is_empty() {
            return Err(StatusCode::BAD_REQUEST);
        }
        if title != task.title {
            changes.insert(
                "title".into(),
                FieldChange {
                    old: task.title.clone(),
                    new: title.clone(),
                },
            );
            task.title = title;
        }
    }
    if let Some(description) = body.description {
        if Some(&description) != task.description.as_ref() {
            changes.insert(
                "description".into(),
                FieldChange {
                    old: render_optional(&task.description),
                    new: description.clone(),
                },
            );
            task.description = Some(description);
        }
    }
    if let Some(status) = body.status {
        validate_status(&status)?;
        if status != task.status {
            changes.insert(
                "status".into(),
                FieldChange {
                    old: task.status.clone(),
                    new: status.clone(),
                },
            );
            task.status = status;
        }
    }
    if let Some(priority) = body.priority {
        validate_priority(&priority)?;
        if priority != task.priority {
            changes.insert(
                "priority".into(),
                FieldChange {
                    old: task.priority.clone(),
                    new: priority.clone(),
                },
            );
            task.priority = priority;
        }
    }
    if let Some(assignee_id) = body.assignee_id {
        if Some(assignee_id) != task.assignee_id {
            changes.insert(
                "assignee".into(),
                FieldChange {
                    old: render_optional(&task.assignee_id),
                    new: assignee_id.to_string(),
                },
            );
            task.assignee_id = Some(assignee_id);
        }
    }
    if let Some(due_at) = body.due_at {
        if Some(due_at) != task.due_at {
            changes.insert(
                "dueAt".into(),
                FieldChange {
                    old: task
                        .due_at
                        .map(|d| d.to_rfc3339())
                        .unwrap_or_default(),
                    new: due_at.to_rfc3339(),
                },
            );
            task.due_at = Some(due_at);
        }
    }

    if changes.is_empty() {
        return Ok((StatusCode::OK, Json(TaskView::from(&task))));
    }

    let task = state.tasks.update(&task).await.map_err(map_core_error)?;

    let assignee_changed = task.assignee_id != previous_assignee_id;
    let targets = recipients::task_updated(
        task.assignee_id,
        Some(task.reporter_id),
        previous_assignee_id.filter(|_| assignee_changed),
        principal.user_id,
    );
    let payload = task_payload(&task, principal.user_ref(), Some(changes));
    if let Err(e) = state.publisher.publish_task_updated(
        task.organization_id,
        principal.user_id,
        targets,
        payload,
    ) {
        warn!("Failed to enqueue task.updated event: {}", e);
    }

    Ok((StatusCode::OK, Json(TaskView::from(&task))))
}

// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let Some(task) = state.tasks.get(id).await.map_err(map_core_error)? else {
        return Err(StatusCode::NOT_FOUND);
    };
    if !principal.organizations.contains(&task.organization_id) {
        return Err(StatusCode::NOT_FOUND);
    }

    let Some(task) = state.tasks.delete(id).await.map_err(map_core_error)? else {
        return Err(StatusCode::NOT_FOUND);
    };

    // Recipients come from the state immediately before deletion.
    let targets = recipients::task_deleted(
        task.assignee_id,
        Some(task.reporter_id),
        principal.user_id,
    );
    let payload = task_payload(&task, principal.user_ref(), None);
    if let Err(e) = state.publisher.publish_task_deleted(
        task.organization_id,
        principal.user_id,
        targets,
        payload,
    ) {
        warn!("Failed to enqueue task.deleted event: {}", e);
    }

    Ok(StatusCode::NO_CONTENT)
}
