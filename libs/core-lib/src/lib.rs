use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use uuid::Uuid;

// Declare modules
pub mod adapters;
pub mod auth;
pub mod events;

// Define a common error type shared by every service in the workspace.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

// Port for publishing events to the message bus. Routing key and event type
// travel separately: the key drives queue bindings, the type rides along in
// message properties.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        routing_key: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError>;
}

/// A user as resolved by the user service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedUser {
    pub user_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

// Port for resolving @handles to users. Backed by the external user service
// in production; in-memory in tests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a batch of usernames within one organization. Unknown
    /// usernames are absent from the returned map.
    async fn resolve_usernames(
        &self,
        organization_id: Uuid,
        usernames: &[String],
    ) -> Result<HashMap<String, ResolvedUser>, CoreError>;
}
