use crate::{CoreError, ResolvedUser, UserDirectory};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// In-memory implementation of the UserDirectory port backed by a seeded
/// username map. Suitable for tests and local single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<DashMap<String, ResolvedUser>>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: ResolvedUser) {
        self.users.insert(user.username.clone(), user);
    }

    pub fn seed(&self, username: &str, user_id: Uuid) -> ResolvedUser {
        let user = ResolvedUser {
            user_id,
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
        };
        self.insert(user.clone());
        user
    }

    /// Number of resolve calls served, for asserting lookup bounds.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn resolve_usernames(
        &self,
        _organization_id: Uuid,
        usernames: &[String],
    ) -> Result<HashMap<String, ResolvedUser>, CoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(usernames
            .iter()
            .filter_map(|name| {
                self.users
                    .get(name)
                    .map(|user| (name.clone(), user.value().clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_known_and_skips_unknown() {
        let directory = InMemoryUserDirectory::new();
        let bob = directory.seed("bob", Uuid::new_v4());

        let resolved = directory
            .resolve_usernames(Uuid::new_v4(), &["bob".into(), "ghost".into()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get("bob"), Some(&bob));
        assert_eq!(directory.lookup_count(), 1);
    }
}
