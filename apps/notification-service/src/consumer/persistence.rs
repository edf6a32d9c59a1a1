//! Persistence consumer: turns one envelope into one stored notification
//! per recipient, republishing each as a distribution message for the
//! WebSocket side. The whole envelope is acked once; a transient failure on
//! any recipient requeues the envelope (at-least-once, duplicates allowed).

use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::sync::Arc;
use tracing::{error, info, warn};

use core_lib::CoreError;
use core_lib::adapters::rabbitmq_event_bus::RabbitMqEventBus;
use core_lib::events::{DistributionMessage, NOTIFICATIONS_QUEUE, NotificationEvent, WS_DISTRIBUTION_QUEUE};

use crate::builder::build_notification;
use crate::store::NotificationStore;

/// What to do with a delivery after processing.
enum Outcome {
    /// Fully processed (or empty); ack.
    Done,
    /// Unrecoverable for this payload; ack to avoid a poison-message loop.
    Poison(CoreError),
    /// Transient failure; nack with requeue and let the broker redeliver.
    Retry(CoreError),
}

pub async fn run(
    bus: Arc<RabbitMqEventBus>,
    store: NotificationStore,
    prefetch: u16,
) -> Result<(), CoreError> {
    let mut consumer = bus
        .consumer(NOTIFICATIONS_QUEUE, "notification-persistence", prefetch)
        .await?;
    info!("Persistence consumer listening on '{}'.", NOTIFICATIONS_QUEUE);

    while let Some(delivery_result) = consumer.next().await {
        let delivery = match delivery_result {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Error receiving notification delivery: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        match process_envelope(&bus, &store, &delivery.data).await {
            Outcome::Done => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!("Failed to ack notification delivery: {}", e);
                }
            }
            Outcome::Poison(e) => {
                error!("Dropping undecodable envelope: {}", e);
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!("Failed to ack poison delivery: {}", e);
                }
            }
            Outcome::Retry(e) => {
                error!("Envelope processing failed, requeueing: {}", e);
                let nack = delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
                if let Err(e) = nack {
                    error!("Failed to nack notification delivery: {}", e);
                }
            }
        }
    }

    warn!("Persistence consumer stream ended.");
    Ok(())
}

async fn process_envelope(
    bus: &RabbitMqEventBus,
    store: &NotificationStore,
    payload: &[u8],
) -> Outcome {
    let event = match NotificationEvent::from_bytes(payload) {
        Ok(event) => event,
        Err(e) => return Outcome::Poison(e),
    };
    if event.recipients.is_empty() {
        return Outcome::Done;
    }

    // The first transient failure is retained; siblings still get their
    // attempt. A requeued envelope is reprocessed from the top, so every
    // recipient stored on an earlier attempt gets a duplicate row with a
    // fresh id.
    let mut first_failure: Option<CoreError> = None;
    for recipient_id in &event.recipients {
        let new_notification = match build_notification(&event, *recipient_id) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    "Skipping recipient {} of {} event: {}",
                    recipient_id, event.event_type, e
                );
                continue;
            }
        };

        let row = match store.create(&new_notification).await {
            Ok(row) => row,
            Err(e) => {
                error!(
                    "Failed to store notification for recipient {}: {}",
                    recipient_id, e
                );
                first_failure.get_or_insert(e);
                continue;
            }
        };

        let message = DistributionMessage {
            user_id: *recipient_id,
            notification: row.view(),
        };
        let publish = match message.to_bytes() {
            Ok(bytes) => {
                bus.publish_to_queue(WS_DISTRIBUTION_QUEUE, "notification.ws.deliver", &bytes)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = publish {
            error!(
                "Failed to publish distribution message for recipient {}: {}",
                recipient_id, e
            );
            first_failure.get_or_insert(e);
        }
    }

    match first_failure {
        Some(e) => Outcome::Retry(e),
        None => Outcome::Done,
    }
}
