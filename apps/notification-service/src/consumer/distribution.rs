//! Distribution consumer: fans stored notifications out to the live
//! sessions of their recipient. Persistence is authoritative; this path is
//! best-effort, so every delivery attempt is acked, including when the user
//! has no sessions at all.

use futures_util::StreamExt;
use lapin::options::BasicAckOptions;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use core_lib::CoreError;
use core_lib::adapters::rabbitmq_event_bus::RabbitMqEventBus;
use core_lib::events::{DistributionMessage, WS_DISTRIBUTION_QUEUE};

use crate::ws::{ConnectionHub, WsFrame};

pub async fn run(
    bus: Arc<RabbitMqEventBus>,
    hub: Arc<ConnectionHub>,
    prefetch: u16,
) -> Result<(), CoreError> {
    let mut consumer = bus
        .consumer(WS_DISTRIBUTION_QUEUE, "notification-ws-distribution", prefetch)
        .await?;
    info!(
        "Distribution consumer listening on '{}'.",
        WS_DISTRIBUTION_QUEUE
    );

    while let Some(delivery_result) = consumer.next().await {
        let delivery = match delivery_result {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("Error receiving distribution delivery: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        match DistributionMessage::from_bytes(&delivery.data) {
            Ok(message) => {
                let frame = WsFrame::notification_created(&message.notification);
                let sent = hub.send_to_user(message.user_id, &frame);
                debug!(
                    "Delivered notification {} to {} session(s) of user {}.",
                    message.notification.id, sent, message.user_id
                );
            }
            Err(e) => {
                error!("Dropping undecodable distribution message: {}", e);
            }
        }

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("Failed to ack distribution delivery: {}", e);
        }
    }

    warn!("Distribution consumer stream ended.");
    Ok(())
}
