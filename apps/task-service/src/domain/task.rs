use chrono::{DateTime, Utc};
use core_lib::CoreError;
use sqlx::PgPool;
use uuid::Uuid;

pub const STATUSES: [&str; 4] = ["todo", "in_progress", "in_review", "done"];
pub const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

pub const DEFAULT_STATUS: &str = "todo";
pub const DEFAULT_PRIORITY: &str = "medium";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
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

#[derive(Debug, Clone)]
pub struct NewTask {
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Uuid,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TaskStore {
    pool: PgPool,
}

impl TaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: &NewTask) -> Result<TaskRow, CoreError> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks
                (id, organization_id, title, description, status, priority,
                 assignee_id, reporter_id, due_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.organization_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.status)
        .bind(&task.priority)
        .bind(task.assignee_id)
        .bind(task.reporter_id)
        .bind(task.due_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<TaskRow>, CoreError> {
        sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    /// Persist the mutable fields of an already-loaded task.
    pub async fn update(&self, task: &TaskRow) -> Result<TaskRow, CoreError> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET title = $2, description = $3, status = $4, priority = $5,
                assignee_id = $6, due_at = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.status)
        .bind(&task.priority)
        .bind(task.assignee_id)
        .bind(task.due_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    /// Delete a task, returning its final state for the deletion event.
    pub async fn delete(&self, id: Uuid) -> Result<Option<TaskRow>, CoreError> {
        sqlx::query_as::<_, TaskRow>("DELETE FROM tasks WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }
}
