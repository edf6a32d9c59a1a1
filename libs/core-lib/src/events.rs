//! Wire contract for the notification pipeline: the broker envelope carrying
//! one domain event plus its recipient list, the per-kind payloads, and the
//! distribution message handed to the WebSocket side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::{CoreError, ResolvedUser};

/// Topic exchange every service publishes to.
pub const EXCHANGE: &str = "events";
/// Queue feeding the persistence consumer.
pub const NOTIFICATIONS_QUEUE: &str = "notifications";
/// Queue feeding the WebSocket distribution consumer; published to by name
/// via the default exchange.
pub const WS_DISTRIBUTION_QUEUE: &str = "notification-ws-distribution";
/// Binding patterns for the `notifications` queue.
pub const NOTIFICATION_BINDINGS: [&str; 2] = ["notification.task.*", "notification.comment.*"];

/// The seven event kinds the pipeline produces. The serialized form doubles
/// as the routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "notification.task.created")]
    TaskCreated,
    #[serde(rename = "notification.task.updated")]
    TaskUpdated,
    #[serde(rename = "notification.task.deleted")]
    TaskDeleted,
    #[serde(rename = "notification.comment.created")]
    CommentCreated,
    #[serde(rename = "notification.comment.updated")]
    CommentUpdated,
    #[serde(rename = "notification.comment.deleted")]
    CommentDeleted,
    #[serde(rename = "notification.comment.mentioned")]
    CommentMentioned,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskCreated => "notification.task.created",
            EventKind::TaskUpdated => "notification.task.updated",
            EventKind::TaskDeleted => "notification.task.deleted",
            EventKind::CommentCreated => "notification.comment.created",
            EventKind::CommentUpdated => "notification.comment.updated",
            EventKind::CommentDeleted => "notification.comment.deleted",
            EventKind::CommentMentioned => "notification.comment.mentioned",
        }
    }

    /// Routing key on the `events` exchange; identical to the wire string.
    pub fn routing_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EventKind::TaskCreated | EventKind::TaskUpdated | EventKind::TaskDeleted => {
                EntityType::Task
            }
            _ => EntityType::Comment,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Task,
    Comment,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Comment => "comment",
        }
    }
}

/// Display information for a user embedded in a payload. Identity travels in
/// the id fields next to it; this is presentation only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserRef {
    /// "First Last", falling back to the username, falling back to "Someone".
    pub fn display_name(&self) -> String {
        let full: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if !full.is_empty() {
            return full.join(" ");
        }
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => "Someone".to_string(),
        }
    }
}

impl From<&ResolvedUser> for UserRef {
    fn from(user: &ResolvedUser) -> Self {
        let non_empty = |s: &str| {
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };
        UserRef {
            username: non_empty(&user.username),
            first_name: non_empty(&user.first_name),
            last_name: non_empty(&user.last_name),
        }
    }
}

/// Before/after values of one modified task field, rendered as strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub due_at: Option<DateTime<Utc>>,
    pub assignee: Option<UserRef>,
    pub reporter: Option<UserRef>,
    pub trigger_user: Option<UserRef>,
    /// Only present on updates: field name -> {old, new}.
    pub changes: Option<BTreeMap<String, FieldChange>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub comment_id: Uuid,
    pub task_id: Uuid,
    pub task_title: String,
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
    pub author_id: Uuid,
    pub author: Option<UserRef>,
    pub mentioned_users: Option<Vec<String>>,
}

/// Payload variant, selected by the envelope's event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Task(TaskPayload),
    Comment(CommentPayload),
}

impl EventPayload {
    pub fn as_task(&self) -> Option<&TaskPayload> {
        match self {
            EventPayload::Task(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_comment(&self) -> Option<&CommentPayload> {
        match self {
            EventPayload::Comment(p) => Some(p),
            _ => None,
        }
    }
}

/// One broker message: a domain event plus the deduplicated recipient set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub organization_id: Uuid,
    pub trigger_user_id: Uuid,
    pub recipients: Vec<Uuid>,
    pub event_type: EventKind,
    pub data: EventPayload,
}

/// Envelope as read off the wire, before ids are parsed and the payload is
/// decoded against the event kind.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    organization_id: String,
    trigger_user_id: String,
    #[serde(default)]
    recipients: Vec<String>,
    event_type: EventKind,
    data: serde_json::Value,
}

impl NotificationEvent {
    pub fn new(
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        event_type: EventKind,
        data: EventPayload,
    ) -> Self {
        Self {
            organization_id,
            trigger_user_id,
            recipients,
            event_type,
            data,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Decode an envelope. Malformed JSON, an unknown event type, a bad
    /// organization or trigger id, or a payload that does not match the
    /// event kind all fail the whole envelope. Malformed recipient ids are
    /// dropped individually; duplicates and the trigger user are filtered.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let wire: WireEnvelope =
            serde_json::from_slice(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))?;

        let organization_id = Uuid::parse_str(&wire.organization_id).map_err(|e| {
            CoreError::Deserialization(format!(
                "Invalid organizationId {}: {}",
                wire.organization_id, e
            ))
        })?;
        let trigger_user_id = Uuid::parse_str(&wire.trigger_user_id).map_err(|e| {
            CoreError::Deserialization(format!(
                "Invalid triggerUserId {}: {}",
                wire.trigger_user_id, e
            ))
        })?;

        let recipients: Vec<Uuid> = wire
            .recipients
            .iter()
            .filter_map(|r| Uuid::parse_str(r).ok())
            .filter(|r| *r != trigger_user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let data = match wire.event_type.entity_type() {
            EntityType::Task => serde_json::from_value::<TaskPayload>(wire.data)
                .map(EventPayload::Task)
                .map_err(|e| {
                    CoreError::Deserialization(format!(
                        "Invalid task payload for {}: {}",
                        wire.event_type, e
                    ))
                })?,
            EntityType::Comment => serde_json::from_value::<CommentPayload>(wire.data)
                .map(EventPayload::Comment)
                .map_err(|e| {
                    CoreError::Deserialization(format!(
                        "Invalid comment payload for {}: {}",
                        wire.event_type, e
                    ))
                })?,
        };

        Ok(Self {
            organization_id,
            trigger_user_id,
            recipients,
            event_type: wire.event_type,
            data,
        })
    }
}

/// Client-facing view of a stored notification, embedded in distribution
/// messages and WebSocket frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub url: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload on the `notification-ws-distribution` queue: one stored
/// notification addressed to one user's live sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionMessage {
    pub user_id: Uuid,
    pub notification: NotificationView,
}

impl DistributionMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_payload(task_id: Uuid) -> EventPayload {
        EventPayload::Task(TaskPayload {
            task_id,
            title: "Fix login".into(),
            description: None,
            status: "todo".into(),
            priority: "high".into(),
            assignee_id: None,
            reporter_id: None,
            due_at: None,
            assignee: None,
            reporter: None,
            trigger_user: Some(UserRef {
                username: Some("ann".into()),
                first_name: Some("Ann".into()),
                last_name: Some("Lee".into()),
            }),
            changes: None,
        })
    }

    #[test]
    fn event_kind_round_trips_as_routing_key() {
        let json = serde_json::to_string(&EventKind::CommentMentioned).unwrap();
        assert_eq!(json, "\"notification.comment.mentioned\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::CommentMentioned);
        assert_eq!(back.routing_key(), "notification.comment.mentioned");
    }

    #[test]
    fn envelope_round_trip() {
        let org = Uuid::new_v4();
        let trigger = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        let event = NotificationEvent::new(
            org,
            trigger,
            vec![recipient],
            EventKind::TaskCreated,
            task_payload(task_id),
        );

        let bytes = event.to_bytes().unwrap();
        let decoded = NotificationEvent::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.organization_id, org);
        assert_eq!(decoded.trigger_user_id, trigger);
        assert_eq!(decoded.recipients, vec![recipient]);
        assert_eq!(decoded.event_type, EventKind::TaskCreated);
        assert_eq!(decoded.data.as_task().unwrap().task_id, task_id);
    }

    #[test]
    fn decode_drops_duplicate_and_trigger_recipients() {
        let trigger = Uuid::new_v4();
        let keep = Uuid::new_v4();
        let raw = serde_json::json!({
            "organizationId": Uuid::new_v4().to_string(),
            "triggerUserId": trigger.to_string(),
            "recipients": [keep.to_string(), keep.to_string(), trigger.to_string(), "not-a-uuid"],
            "eventType": "notification.task.created",
            "data": {
                "taskId": Uuid::new_v4().to_string(),
                "title": "T",
                "status": "todo",
                "priority": "low"
            }
        });
        let decoded = NotificationEvent::from_bytes(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(decoded.recipients, vec![keep]);
    }

    #[test]
    fn decode_rejects_bad_trigger_id() {
        let raw = serde_json::json!({
            "organizationId": Uuid::new_v4().to_string(),
            "triggerUserId": "nope",
            "recipients": [],
            "eventType": "notification.task.created",
            "data": {}
        });
        let err = NotificationEvent::from_bytes(&serde_json::to_vec(&raw).unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }

    #[test]
    fn decode_rejects_unknown_event_type() {
        let raw = serde_json::json!({
            "organizationId": Uuid::new_v4().to_string(),
            "triggerUserId": Uuid::new_v4().to_string(),
            "recipients": [],
            "eventType": "notification.task.archived",
            "data": {}
        });
        assert!(NotificationEvent::from_bytes(&serde_json::to_vec(&raw).unwrap()).is_err());
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        // Comment kind with a payload missing comment fields
        let raw = serde_json::json!({
            "organizationId": Uuid::new_v4().to_string(),
            "triggerUserId": Uuid::new_v4().to_string(),
            "recipients": [Uuid::new_v4().to_string()],
            "eventType": "notification.comment.created",
            "data": { "taskId": Uuid::new_v4().to_string(), "title": "T" }
        });
        assert!(NotificationEvent::from_bytes(&serde_json::to_vec(&raw).unwrap()).is_err());
    }

    #[test]
    fn display_name_falls_back() {
        let full = UserRef {
            username: Some("ann".into()),
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
        };
        assert_eq!(full.display_name(), "Ann Lee");

        let handle_only = UserRef {
            username: Some("ann".into()),
            ..Default::default()
        };
        assert_eq!(handle_only.display_name(), "ann");

        assert_eq!(UserRef::default().display_name(), "Someone");
    }

    #[test]
    fn distribution_message_uses_camel_case() {
        let msg = DistributionMessage {
            user_id: Uuid::new_v4(),
            notification: NotificationView {
                id: Uuid::new_v4(),
                kind: "notification.task.created".into(),
                title: "New task assigned".into(),
                message: "Ann Lee created task: Fix login".into(),
                entity_type: EntityType::Task,
                entity_id: Uuid::new_v4(),
                url: "/tasks/abc".into(),
                is_read: false,
                created_at: Utc::now(),
            },
        };
        let value: serde_json::Value =
            serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert!(value.get("userId").is_some());
        let n = value.get("notification").unwrap();
        assert!(n.get("entityType").is_some());
        assert!(n.get("isRead").is_some());
        assert!(n.get("createdAt").is_some());
        assert_eq!(n.get("type").unwrap(), "notification.task.created");
    }
}
