use crate::{CoreError, ResolvedUser, UserDirectory};
use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use proto::userdirectory::{ResolveUsernamesRequest, user_directory_client::UserDirectoryClient};
use std::collections::HashMap;
use std::time::Duration;
use tonic::transport::Channel;
use tracing::{debug, info};
use uuid::Uuid;

/// gRPC implementation of the UserDirectory port against the user service,
/// with a short-lived per-process cache so repeated handles across envelopes
/// do not keep hitting the wire. A negative result is cached too.
#[derive(Clone)]
pub struct GrpcUserDirectory {
    client: UserDirectoryClient<Channel>,
    cache: MokaCache<String, Option<ResolvedUser>>,
}

impl GrpcUserDirectory {
    /// Build a client without touching the network; the channel connects on
    /// first use and reconnects on failure.
    pub fn connect_lazy(addr: String) -> Result<Self, CoreError> {
        let endpoint = tonic::transport::Endpoint::from_shared(addr.clone()).map_err(|e| {
            CoreError::Configuration(format!("Invalid user directory address {}: {}", addr, e))
        })?;
        info!("User directory client targeting {}.", addr);
        Ok(Self::with_client(UserDirectoryClient::new(
            endpoint.connect_lazy(),
        )))
    }

    pub fn with_client(client: UserDirectoryClient<Channel>) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60))
            .build();
        Self { client, cache }
    }

    fn cache_key(organization_id: Uuid, username: &str) -> String {
        format!("{}:{}", organization_id, username)
    }
}

#[async_trait]
impl UserDirectory for GrpcUserDirectory {
    async fn resolve_usernames(
        &self,
        organization_id: Uuid,
        usernames: &[String],
    ) -> Result<HashMap<String, ResolvedUser>, CoreError> {
        let mut resolved = HashMap::new();
        let mut misses = Vec::new();

        for username in usernames {
            match self
                .cache
                .get(&Self::cache_key(organization_id, username))
                .await
            {
                Some(Some(user)) => {
                    resolved.insert(username.clone(), user);
                }
                Some(None) => {
                    // Known-unknown handle; skip the wire.
                }
                None => misses.push(username.clone()),
            }
        }

        if misses.is_empty() {
            return Ok(resolved);
        }
        debug!(
            "Resolving {} username(s) via user directory.",
            misses.len()
        );

        let mut client = self.client.clone();
        let response = client
            .resolve_usernames(ResolveUsernamesRequest {
                organization_id: organization_id.to_string(),
                usernames: misses.clone(),
            })
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?
            .into_inner();

        let mut found: HashMap<String, ResolvedUser> = HashMap::new();
        for user in response.users {
            let user_id = Uuid::parse_str(&user.user_id).map_err(|e| {
                CoreError::Deserialization(format!("Invalid user_id {}: {}", user.user_id, e))
            })?;
            found.insert(
                user.username.clone(),
                ResolvedUser {
                    user_id,
                    username: user.username,
                    first_name: user.first_name,
                    last_name: user.last_name,
                },
            );
        }

        for username in misses {
            let entry = found.get(&username).cloned();
            self.cache
                .insert(Self::cache_key(organization_id, &username), entry.clone())
                .await;
            if let Some(user) = entry {
                resolved.insert(username, user);
            }
        }

        Ok(resolved)
    }
}
