//! Pure construction of one stored notification from an envelope and a
//! recipient. Everything around it is I/O; this is the part worth testing
//! exhaustively.

use core_lib::CoreError;
use core_lib::events::{EventKind, EventPayload, NotificationEvent, UserRef};
use uuid::Uuid;

use crate::store::NewNotification;

fn display_name(user: Option<&UserRef>) -> String {
    user.map(UserRef::display_name)
        .unwrap_or_else(|| "Someone".to_string())
}

/// Map an envelope to the stored fields for one recipient. Fails on a
/// payload that does not match the event kind or renders an empty title or
/// message; the caller drops the recipient and keeps going.
pub fn build_notification(
    event: &NotificationEvent,
    recipient_id: Uuid,
) -> Result<NewNotification, CoreError> {
    let (title, message, entity_id, url) = match (event.event_type, &event.data) {
        (EventKind::TaskCreated, EventPayload::Task(task)) => (
            "New task assigned".to_string(),
            format!(
                "{} created task: {}",
                display_name(task.trigger_user.as_ref()),
                task.title
            ),
            task.task_id,
            format!("/tasks/{}", task.task_id),
        ),
        (EventKind::TaskUpdated, EventPayload::Task(task)) => (
            "Task updated".to_string(),
            format!(
                "{} updated task: {}",
                display_name(task.trigger_user.as_ref()),
                task.title
            ),
            task.task_id,
            format!("/tasks/{}", task.task_id),
        ),
        (EventKind::TaskDeleted, EventPayload::Task(task)) => (
            "Task deleted".to_string(),
            format!(
                "{} deleted task: {}",
                display_name(task.trigger_user.as_ref()),
                task.title
            ),
            task.task_id,
            format!("/tasks/{}", task.task_id),
        ),
        (EventKind::CommentCreated, EventPayload::Comment(comment)) => (
            "New comment".to_string(),
            format!(
                "{} commented on: {}",
                display_name(comment.author.as_ref()),
                comment.task_title
            ),
            comment.comment_id,
            format!("/tasks/{}#comment-{}", comment.task_id, comment.comment_id),
        ),
        (EventKind::CommentUpdated, EventPayload::Comment(comment)) => (
            "Comment updated".to_string(),
            format!(
                "{} updated a comment on: {}",
                display_name(comment.author.as_ref()),
                comment.task_title
            ),
            comment.comment_id,
            format!("/tasks/{}#comment-{}", comment.task_id, comment.comment_id),
        ),
        (EventKind::CommentDeleted, EventPayload::Comment(comment)) => (
            "Comment deleted".to_string(),
            format!(
                "{} deleted a comment on: {}",
                display_name(comment.author.as_ref()),
                comment.task_title
            ),
            comment.comment_id,
            format!("/tasks/{}", comment.task_id),
        ),
        (EventKind::CommentMentioned, EventPayload::Comment(comment)) => (
            "You were mentioned".to_string(),
            format!(
                "{} mentioned you in: {}",
                display_name(comment.author.as_ref()),
                comment.task_title
            ),
            comment.comment_id,
            format!("/tasks/{}#comment-{}", comment.task_id, comment.comment_id),
        ),
        (kind, _) => {
            return Err(CoreError::Validation(format!(
                "Payload does not match event type {}",
                kind
            )));
        }
    };

    if title.is_empty() || message.is_empty() {
        return Err(CoreError::Validation(format!(
            "Empty title or message for {}",
            event.event_type
        )));
    }

    Ok(NewNotification {
        user_id: recipient_id,
        organization_id: event.organization_id,
        trigger_user_id: event.trigger_user_id,
        kind: event.event_type,
        entity_type: event.event_type.entity_type(),
        entity_id,
        title,
        message,
        url,
        data: serde_json::to_value(&event.data).ok(),
    })
}
