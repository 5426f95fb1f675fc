use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

use crate::{
    models::{Role, UserRecord},
    repository::{RepoResult, Repository},
};

/// resolve_role
///
/// Looks the email up in the admin, faculty and student groups, in that order.
/// The first group containing it decides the role; `None` means the email is in
/// no group and access must be denied.
pub async fn resolve_role(repo: &dyn Repository, email: &str) -> RepoResult<Option<UserRecord>> {
    for role in Role::RESOLUTION_ORDER {
        if let Some(user) = repo.find_in_group(role, email).await? {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

/// RoleCache
///
/// Resolved identities keyed by email, each stamped with the instant it was
/// resolved. Entries older than `ttl` are treated as absent. Misses are never
/// stored, so an email that resolves to no role is re-checked on every request.
pub struct RoleCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (UserRecord, Instant)>>,
}

pub type RoleCacheState = Arc<RoleCache>;

impl RoleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, email: &str) -> Option<UserRecord> {
        let entries = self.entries.read().await;
        entries
            .get(email)
            .filter(|(_, resolved_at)| resolved_at.elapsed() < self.ttl)
            .map(|(user, _)| user.clone())
    }

    /// Stores a fresh entry and drops every expired one, so the map only holds
    /// users seen within the last `ttl`.
    pub async fn put(&self, user: UserRecord) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, resolved_at)| resolved_at.elapsed() < self.ttl);
        entries.insert(user.email.clone(), (user, Instant::now()));
    }

    pub async fn invalidate(&self, email: &str) {
        if self.entries.write().await.remove(email).is_some() {
            tracing::debug!(email, "role cache entry invalidated");
        }
    }

    /// Cache-aside resolution: a fresh entry is served directly, anything else is
    /// resolved against the store and cached on a hit.
    pub async fn resolve(
        &self,
        repo: &dyn Repository,
        email: &str,
    ) -> RepoResult<Option<UserRecord>> {
        if let Some(user) = self.get(email).await {
            return Ok(Some(user));
        }
        let resolved = resolve_role(repo, email).await?;
        match &resolved {
            Some(user) => self.put(user.clone()).await,
            // Stale entries for users who lost every group must not survive.
            None => self.invalidate(email).await,
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    fn user(email: &str, role: Role) -> UserRecord {
        UserRecord {
            name: "Test".to_string(),
            email: email.to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_admin_wins_over_student() {
        let repo = InMemoryRepository::new();
        repo.seed_user(user("both@college.edu", Role::Student)).await;
        repo.seed_user(user("both@college.edu", Role::Admin)).await;

        let resolved = resolve_role(&repo, "both@college.edu").await.unwrap();
        assert_eq!(resolved.map(|u| u.role), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_unknown_email_resolves_to_none() {
        let repo = InMemoryRepository::new();
        assert!(resolve_role(&repo, "ghost@college.edu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let repo = InMemoryRepository::new();
        repo.seed_user(user("f@college.edu", Role::Faculty)).await;
        let cache = RoleCache::new(Duration::from_secs(60));

        let first = cache.resolve(&repo, "f@college.edu").await.unwrap().unwrap();
        assert_eq!(first.role, Role::Faculty);

        // A role change behind the cache's back stays invisible until invalidation.
        repo.change_role("f@college.edu", Role::Admin, "root@college.edu")
            .await
            .unwrap();
        let cached = cache.resolve(&repo, "f@college.edu").await.unwrap().unwrap();
        assert_eq!(cached.role, Role::Faculty);

        cache.invalidate("f@college.edu").await;
        let fresh = cache.resolve(&repo, "f@college.edu").await.unwrap().unwrap();
        assert_eq!(fresh.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_expired_entries_are_re_resolved() {
        let repo = InMemoryRepository::new();
        repo.seed_user(user("s@college.edu", Role::Student)).await;
        let cache = RoleCache::new(Duration::ZERO);

        cache.resolve(&repo, "s@college.edu").await.unwrap();
        assert!(cache.get("s@college.edu").await.is_none());
    }

    #[tokio::test]
    async fn test_put_evicts_expired_entries() {
        let cache = RoleCache::new(Duration::from_millis(50));
        cache.put(user("old-1@college.edu", Role::Student)).await;
        cache.put(user("old-2@college.edu", Role::Faculty)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        cache.put(user("new@college.edu", Role::Admin)).await;

        let entries = cache.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("new@college.edu"));
    }
}
