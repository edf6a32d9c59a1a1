use chrono::{DateTime, Utc};
use core_lib::CoreError;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CommentStore {
    pool: PgPool,
}

impl CommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, comment: &NewComment) -> Result<CommentRow, CoreError> {
        sqlx::query_as::<_, CommentRow>(
            r#"
            INSERT INTO comments (id, task_id, author_id, content, parent_comment_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(comment.task_id)
        .bind(comment.author_id)
        .bind(&comment.content)
        .bind(comment.parent_comment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CommentRow>, CoreError> {
        sqlx::query_as::<_, CommentRow>("SELECT * FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    pub async fn update_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> Result<Option<CommentRow>, CoreError> {
        sqlx::query_as::<_, CommentRow>(
            r#"
            UPDATE comments
            SET content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    pub async fn delete(&self, id: Uuid) -> Result<Option<CommentRow>, CoreError> {
        sqlx::query_as::<_, CommentRow>("DELETE FROM comments WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }
}
