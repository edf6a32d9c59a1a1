use crate::{CoreError, EventPublisher};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// One message captured by the in-memory bus.
#[derive(Clone, Debug)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// In-memory implementation of the EventPublisher port that records every
/// publish. Suitable for unit tests asserting on what was emitted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
    fail_publishes: Arc<Mutex<bool>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().expect("bus poisoned").clone()
    }

    pub fn published_with_key(&self, routing_key: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.routing_key == routing_key)
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().expect("bus poisoned").clear();
    }

    /// Make subsequent publishes fail, to exercise error paths.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_publishes.lock().expect("bus poisoned") = failing;
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        routing_key: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError> {
        if *self.fail_publishes.lock().expect("bus poisoned") {
            return Err(CoreError::Internal("publish disabled".into()));
        }
        self.messages
            .lock()
            .expect("bus poisoned")
            .push(PublishedMessage {
                routing_key: routing_key.to_string(),
                event_type: event_type.to_string(),
                payload: event_payload.to_vec(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_publishes_in_order() {
        let bus = InMemoryEventBus::new();
        bus.publish("a.key", "a", b"1").await.unwrap();
        bus.publish("b.key", "b", b"2").await.unwrap();

        let all = bus.published();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].routing_key, "a.key");
        assert_eq!(all[1].payload, b"2");
        assert_eq!(bus.published_with_key("a.key").len(), 1);
    }

    #[tokio::test]
    async fn failing_mode_returns_errors() {
        let bus = InMemoryEventBus::new();
        bus.set_failing(true);
        assert!(bus.publish("k", "t", b"x").await.is_err());
        assert!(bus.published().is_empty());
    }
}
