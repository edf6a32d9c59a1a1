//! Notification publisher: the contract task and comment handlers call
//! after their transaction commits. Envelopes are handed to a background
//! worker over a bounded channel so a slow broker never backpressures HTTP
//! requests; publish failures are logged and surfaced but must never abort
//! the originating action.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use core_lib::events::{
    CommentPayload, EventKind, EventPayload, NotificationEvent, TaskPayload,
};
use core_lib::{CoreError, EventPublisher};

const OUTBOX_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct NotificationPublisher {
    outbox: mpsc::Sender<NotificationEvent>,
}

impl NotificationPublisher {
    /// Spawn the publish worker. The returned handle is only useful for
    /// draining in tests; the worker ends when the last publisher clone is
    /// dropped.
    pub fn spawn(bus: Arc<dyn EventPublisher>) -> (Self, JoinHandle<()>) {
        let (outbox, mut inbox) = mpsc::channel::<NotificationEvent>(OUTBOX_CAPACITY);
        let worker = tokio::spawn(async move {
            while let Some(event) = inbox.recv().await {
                let bytes = match event.to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!("Failed to serialize {} envelope: {}", event.event_type, e);
                        continue;
                    }
                };
                let routing_key = event.event_type.routing_key();
                if let Err(e) = bus.publish(routing_key, event.event_type.as_str(), &bytes).await {
                    // The mutation already committed; the envelope is lost
                    // until the client refetches. Log loudly and move on.
                    error!("Failed to publish {} envelope: {}", event.event_type, e);
                } else {
                    debug!(
                        "Published {} envelope for {} recipient(s).",
                        event.event_type,
                        event.recipients.len()
                    );
                }
            }
            info!("Notification publish worker stopped.");
        });
        (Self { outbox }, worker)
    }

    /// Enqueue one envelope. Empty recipient sets are a silent no-op.
    pub fn submit(&self, event: NotificationEvent) -> Result<(), CoreError> {
        if event.recipients.is_empty() {
            return Ok(());
        }
        self.outbox
            .try_send(event)
            .map_err(|e| CoreError::Internal(format!("Notification outbox unavailable: {}", e)))
    }

    pub fn publish_task_created(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        payload: TaskPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            recipients,
            EventKind::TaskCreated,
            EventPayload::Task(payload),
        ))
    }

    pub fn publish_task_updated(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        payload: TaskPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            recipients,
            EventKind::TaskUpdated,
            EventPayload::Task(payload),
        ))
    }

    pub fn publish_task_deleted(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        payload: TaskPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            recipients,
            EventKind::TaskDeleted,
            EventPayload::Task(payload),
        ))
    }

    pub fn publish_comment_created(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        payload: CommentPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            recipients,
            EventKind::CommentCreated,
            EventPayload::Comment(payload),
        ))
    }

    pub fn publish_comment_updated(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        payload: CommentPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            recipients,
            EventKind::CommentUpdated,
            EventPayload::Comment(payload),
        ))
    }

    pub fn publish_comment_deleted(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        recipients: Vec<Uuid>,
        payload: CommentPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            recipients,
            EventKind::CommentDeleted,
            EventPayload::Comment(payload),
        ))
    }

    pub fn publish_comment_mention(
        &self,
        organization_id: Uuid,
        trigger_user_id: Uuid,
        mentioned_user_ids: Vec<Uuid>,
        payload: CommentPayload,
    ) -> Result<(), CoreError> {
        self.submit(NotificationEvent::new(
            organization_id,
            trigger_user_id,
            mentioned_user_ids,
            EventKind::CommentMentioned,
            EventPayload::Comment(payload),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_lib::adapters::in_memory_event_bus::InMemoryEventBus;
    use core_lib::events::UserRef;
    use tokio::time::{Duration, sleep};

    fn payload(task_id: Uuid) -> TaskPayload {
        TaskPayload {
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
        }
    }

    async fn drain(bus: &InMemoryEventBus, expected: usize) {
        for _ in 0..100 {
            if bus.published().len() >= expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("publish worker never emitted {} message(s)", expected);
    }

    #[tokio::test]
    async fn envelopes_reach_the_bus_with_the_event_type_as_routing_key() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, _worker) = NotificationPublisher::spawn(bus.clone());

        let recipient = Uuid::new_v4();
        publisher
            .publish_task_created(Uuid::new_v4(), Uuid::new_v4(), vec![recipient], payload(Uuid::new_v4()))
            .unwrap();
        drain(&bus, 1).await;

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "notification.task.created");
        assert_eq!(published[0].event_type, "notification.task.created");
        let event = NotificationEvent::from_bytes(&published[0].payload).unwrap();
        assert_eq!(event.recipients, vec![recipient]);
    }

    #[tokio::test]
    async fn empty_recipient_sets_are_silent_no_ops() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, _worker) = NotificationPublisher::spawn(bus.clone());

        publisher
            .publish_task_created(Uuid::new_v4(), Uuid::new_v4(), vec![], payload(Uuid::new_v4()))
            .unwrap();
        sleep(Duration::from_millis(50)).await;
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn broker_failures_do_not_poison_the_worker() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (publisher, _worker) = NotificationPublisher::spawn(bus.clone());

        bus.set_failing(true);
        publisher
            .publish_task_created(Uuid::new_v4(), Uuid::new_v4(), vec![Uuid::new_v4()], payload(Uuid::new_v4()))
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        bus.set_failing(false);
        publisher
            .publish_task_updated(Uuid::new_v4(), Uuid::new_v4(), vec![Uuid::new_v4()], payload(Uuid::new_v4()))
            .unwrap();
        drain(&bus, 1).await;
        assert_eq!(bus.published()[0].routing_key, "notification.task.updated");
    }
}
