//! Durable per-user notification records. Every mutation is filtered by
//! `id AND user_id`; ownership is the authorization boundary.

use chrono::{DateTime, Utc};
use core_lib::CoreError;
use core_lib::events::{EntityType, EventKind, NotificationView};
use sqlx::PgPool;
use uuid::Uuid;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// A notification about to be inserted; ids and timestamps are generated at
/// insert time.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub trigger_user_id: Uuid,
    pub kind: EventKind,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub title: String,
    pub message: String,
    pub url: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub trigger_user_id: Uuid,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub title: String,
    pub message: String,
    pub url: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRow {
    /// Client-facing projection used by the query API, the distribution
    /// queue, and WebSocket frames.
    pub fn view(&self) -> NotificationView {
        NotificationView {
            id: self.id,
            kind: self.kind.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
            entity_type: if self.entity_type == "comment" {
                EntityType::Comment
            } else {
                EntityType::Task
            },
            entity_id: self.entity_id,
            url: self.url.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug)]
pub struct NotificationPage {
    pub items: Vec<NotificationRow>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

/// Clamp pagination input: page starts at 1, limit lands in [1, 100] with a
/// default of 20.
pub fn normalize_pagination(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    (page, limit)
}

#[derive(Clone)]
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn create(&self, notification: &NewNotification) -> Result<NotificationRow, CoreError> {
        sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications
                (id, user_id, organization_id, trigger_user_id, type, entity_type,
                 entity_id, title, message, url, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.organization_id)
        .bind(notification.trigger_user_id)
        .bind(notification.kind.as_str())
        .bind(notification.entity_type.as_str())
        .bind(notification.entity_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.url)
        .bind(&notification.data)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
        unread_only: bool,
    ) -> Result<NotificationPage, CoreError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;

        let offset = (page as i64 - 1) * limit as i64;
        let items = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;

        let total = total as u64;
        Ok(NotificationPage {
            items,
            total,
            page,
            limit,
            has_more: (page as u64) * (limit as u64) < total,
        })
    }

    /// Mark one notification read. Repeat calls keep the original read_at.
    /// Returns false when the row does not exist for this owner.
    pub async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW()), updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        Ok(result.rows_affected())
    }

    /// Returns false when the row does not exist for this owner.
    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64, CoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(normalize_pagination(None, None), (1, 20));
        assert_eq!(normalize_pagination(Some(0), Some(0)), (1, 1));
        assert_eq!(normalize_pagination(Some(3), Some(250)), (3, 100));
        assert_eq!(normalize_pagination(Some(2), Some(50)), (2, 50));
    }
}
