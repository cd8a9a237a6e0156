//! Read-through role cache consulted by the HTTP authorization gates.

use std::future::Future;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::models::Roles;

/// Maps (username, community id) to the roles last loaded from storage.
pub struct RoleCache {
    entries: DashMap<(String, String), (Roles, Instant)>,
    ttl: Duration,
}

impl RoleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cached roles, or the result of `load` when the entry is missing or stale.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        username: &str,
        community_id: &str,
        load: F,
    ) -> Result<Roles, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Roles, E>>,
    {
        let key = (username.to_string(), community_id.to_string());
        if let Some(entry) = self.entries.get(&key) {
            let (roles, loaded_at) = *entry.value();
            if loaded_at.elapsed() < self.ttl {
                return Ok(roles);
            }
        }

        let roles = load().await?;
        self.entries.insert(key, (roles, Instant::now()));
        Ok(roles)
    }

    /// Drop everything cached for a user.
    pub fn invalidate(&self, username: &str) {
        self.entries.retain(|(user, _), _| user != username);
    }

    /// Drop everything cached for a community.
    pub fn invalidate_community(&self, community_id: &str) {
        self.entries.retain(|(_, community), _| community != community_id);
    }

    /// Periodically clean up expired entries (call from a background task)
    pub fn cleanup(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, loaded_at)| loaded_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
