//! Session resolution.
//!
//! Cache-aside read path for per-request authorization: serve the cached
//! projection when it is live, otherwise re-derive it from the user store.

use crate::cache::{SessionCache, SessionCacheEntry};
use crate::config::SessionCacheConfig;
use crate::error::Result;
use crate::providers::UserRepository;
use crate::state::UserId;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Resolves the session projection for a user.
#[derive(Debug)]
pub struct SessionResolver<U: UserRepository> {
    users: U,
    cache: Arc<SessionCache>,
    ttl: Duration,
}

impl<U: UserRepository> SessionResolver<U> {
    /// Create a resolver over `users`, caching into `cache` for `config.ttl`.
    #[must_use]
    pub fn new(users: U, cache: Arc<SessionCache>, config: &SessionCacheConfig) -> Self {
        Self {
            users,
            cache,
            ttl: config.ttl,
        }
    }

    /// The shared cache handle.
    #[must_use]
    pub const fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Resolve the session entry for `user_id`.
    ///
    /// Returns `Ok(None)` for an unknown user. The derived entry expires with
    /// the user's bearer token when one is recorded, otherwise after the
    /// cache ttl. An entry that is already expired is returned uncached so
    /// the caller can reject it. A derivation that raced an invalidation of
    /// the same user is returned but not cached.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the user store lookup fails.
    pub async fn resolve(&self, user_id: UserId) -> Result<Option<SessionCacheEntry>> {
        if let Some(entry) = self.cache.get(&user_id) {
            return Ok(Some(entry));
        }

        let fill = self.cache.fill_token();
        let Some(user) = self.users.get_by_id(user_id).await? else {
            return Ok(None);
        };

        let now = self.cache.clock().now();
        let expires_at = user.token_expires_at.unwrap_or_else(|| {
            now.checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let entry = SessionCacheEntry::from_user(&user, expires_at);

        if entry.is_expired_at(now) {
            tracing::debug!(user_id = %user_id, "Derived session is already expired");
            return Ok(Some(entry));
        }

        if !self
            .cache
            .put_if_unchanged(user_id, fill, entry.clone(), self.ttl)
        {
            tracing::debug!(user_id = %user_id, "Session invalidated during derivation, not caching");
        }
        Ok(Some(entry))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::Clock;
    use crate::mocks::{ManualClock, MockUserRepository};
    use crate::state::{EmailStatus, ExternalId, LocalUser, NoticeStatus, UserStatus};

    fn user(clock: &ManualClock, token_ttl: Option<Duration>) -> LocalUser {
        LocalUser {
            id: UserId::new(),
            external_id: Some(ExternalId(42)),
            username: "Ann".to_string(),
            display_name: "Ann".to_string(),
            email: "a@x.com".to_string(),
            local_secret: "secret".to_string(),
            access_token: "tok1".to_string(),
            token_expires_at: token_ttl.map(|ttl| clock.now() + ttl),
            status: UserStatus::Available,
            email_status: EmailStatus::ToBeVerified,
            notice_status: NoticeStatus::On,
            answer_count: 0,
            question_count: 0,
            last_login_at: None,
            created_at: clock.now(),
        }
    }

    fn resolver(clock: &ManualClock, repo: &MockUserRepository) -> SessionResolver<MockUserRepository> {
        let cache = Arc::new(SessionCache::with_clock(Arc::new(clock.clone())));
        SessionResolver::new(repo.clone(), cache, &SessionCacheConfig::default())
    }

    #[tokio::test]
    async fn test_unknown_user_resolves_to_none() {
        let clock = ManualClock::default();
        let resolver = resolver(&clock, &MockUserRepository::new());

        assert_eq!(resolver.resolve(UserId::new()).await.unwrap(), None);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_miss_derives_and_caches() {
        let clock = ManualClock::default();
        let repo = MockUserRepository::new();
        let u = user(&clock, Some(Duration::hours(1)));
        repo.seed(u.clone()).unwrap();
        let resolver = resolver(&clock, &repo);

        let entry = resolver.resolve(u.id).await.unwrap().unwrap();

        assert_eq!(entry.user_id, u.id);
        assert!(entry.is_active());
        assert!(!entry.is_email_verified());
        assert_eq!(Some(entry.expires_at), u.token_expires_at);
        assert_eq!(resolver.cache().get(&u.id), Some(entry));
    }

    #[tokio::test]
    async fn test_hit_skips_store() {
        let clock = ManualClock::default();
        let repo = MockUserRepository::new();
        let u = user(&clock, Some(Duration::hours(1)));
        repo.seed(u.clone()).unwrap();
        let resolver = resolver(&clock, &repo);

        resolver.resolve(u.id).await.unwrap();
        repo.set_fail_reads(true);

        assert!(resolver.resolve(u.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_without_token_expiry_uses_ttl() {
        let clock = ManualClock::default();
        let repo = MockUserRepository::new();
        let u = user(&clock, None);
        repo.seed(u.clone()).unwrap();
        let resolver = resolver(&clock, &repo);

        let entry = resolver.resolve(u.id).await.unwrap().unwrap();

        assert_eq!(entry.expires_at, clock.now() + SessionCacheConfig::default().ttl);
    }

    #[tokio::test]
    async fn test_expired_token_is_not_cached() {
        let clock = ManualClock::default();
        let repo = MockUserRepository::new();
        let u = user(&clock, Some(Duration::seconds(-1)));
        repo.seed(u.clone()).unwrap();
        let resolver = resolver(&clock, &repo);

        let entry = resolver.resolve(u.id).await.unwrap().unwrap();

        assert!(entry.is_expired_at(clock.now()));
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let clock = ManualClock::default();
        let repo = MockUserRepository::new();
        let u = user(&clock, None);
        repo.seed(u.clone()).unwrap();
        let cache = Arc::new(SessionCache::with_clock(Arc::new(clock.clone())));
        let config = SessionCacheConfig::default().with_ttl(Duration::MAX);
        let resolver = SessionResolver::new(repo.clone(), cache, &config);

        let entry = resolver.resolve(u.id).await.unwrap().unwrap();

        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(resolver.cache().get(&u.id), Some(entry));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let clock = ManualClock::default();
        let repo = MockUserRepository::new();
        repo.set_fail_reads(true);
        let resolver = resolver(&clock, &repo);

        assert!(resolver.resolve(UserId::new()).await.is_err());
    }
}
