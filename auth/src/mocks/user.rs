//! Mock user repository for testing.

use crate::error::{IdentityBridgeError, Result};
use crate::providers::UserRepository;
use crate::state::{
    EmailStatus, ExternalId, LocalUser, NoticeStatus, ProfileUpdate, UserId, UserStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Mock user repository.
///
/// Uses in-memory storage. External ID uniqueness is enforced under the same
/// lock as the insert, like a unique index would.
///
/// Clones share state, so a test can keep a handle for assertions after
/// moving one into the synchronizer.
#[derive(Debug, Clone, Default)]
pub struct MockUserRepository {
    users: Arc<Mutex<HashMap<UserId, LocalUser>>>,

    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_token_updates: Arc<AtomicBool>,
    race_next_insert: Arc<AtomicBool>,
    insert_delay_ms: Arc<AtomicU64>,
    read_delay_ms: Arc<AtomicU64>,

    insert_attempts: Arc<AtomicUsize>,
    duplicate_rejections: Arc<AtomicUsize>,
    token_updates: Arc<AtomicUsize>,
}

impl MockUserRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Failure injection
    // ═══════════════════════════════════════════════════════════════════════

    /// Make every lookup fail with `StorageError`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every insert and update fail with `StorageError`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only `update_token_fields` fail with `StorageError`.
    pub fn set_fail_token_updates(&self, fail: bool) {
        self.fail_token_updates.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside `insert` before touching storage.
    ///
    /// Widens the window between lookup and insert so concurrent first
    /// logins actually collide.
    pub fn set_insert_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.insert_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Sleep this long inside `get_by_id` after reading the row.
    ///
    /// Lets a write land between a reader's lookup and its use of the
    /// result.
    pub fn set_read_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.read_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Lose the next insert race.
    ///
    /// The next `insert` stores a competing row with the same external ID
    /// under a fresh internal ID, then reports `DuplicateIdentity`.
    pub fn race_next_insert(&self) {
        self.race_next_insert.store(true, Ordering::SeqCst);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    /// Put a user directly into storage, bypassing uniqueness checks.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn seed(&self, user: LocalUser) -> Result<()> {
        self.lock()?.insert(user.id, user);
        Ok(())
    }

    /// Number of stored users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.lock().map(|users| users.len()).unwrap_or_default()
    }

    /// Snapshot of every stored user.
    #[must_use]
    pub fn users(&self) -> Vec<LocalUser> {
        self.lock()
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `insert` calls.
    #[must_use]
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    /// Number of inserts rejected with `DuplicateIdentity`.
    #[must_use]
    pub fn duplicate_rejections(&self) -> usize {
        self.duplicate_rejections.load(Ordering::SeqCst)
    }

    /// Number of `update_token_fields` calls, failed ones included.
    #[must_use]
    pub fn token_updates(&self) -> usize {
        self.token_updates.load(Ordering::SeqCst)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<UserId, LocalUser>>> {
        self.users
            .lock()
            .map_err(|_| IdentityBridgeError::InternalError("Mutex lock failed".to_string()))
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(IdentityBridgeError::StorageError(
                "injected read failure".to_string(),
            ));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IdentityBridgeError::StorageError(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn find(&self, predicate: impl Fn(&LocalUser) -> bool) -> Result<Option<LocalUser>> {
        self.check_reads()?;
        Ok(self.lock()?.values().find(|user| predicate(user)).cloned())
    }

    fn update(&self, user_id: UserId, apply: impl FnOnce(&mut LocalUser)) -> Result<()> {
        self.check_writes()?;
        let mut users = self.lock()?;
        let user = users
            .get_mut(&user_id)
            .ok_or(IdentityBridgeError::UserNotFound)?;
        apply(user);
        Ok(())
    }

    fn insert_now(&self, user: &LocalUser) -> Result<()> {
        self.check_writes()?;
        let mut users = self.lock()?;

        if let Some(external_id) = user.external_id {
            if self.race_next_insert.swap(false, Ordering::SeqCst) {
                let competitor = LocalUser {
                    id: UserId::new(),
                    ..user.clone()
                };
                users.insert(competitor.id, competitor);
            }

            let taken = users
                .values()
                .any(|existing| existing.external_id == Some(external_id));
            if taken {
                self.duplicate_rejections.fetch_add(1, Ordering::SeqCst);
                return Err(IdentityBridgeError::DuplicateIdentity {
                    external_id: external_id.0,
                });
            }
        }

        if users.contains_key(&user.id) {
            return Err(IdentityBridgeError::StorageError(format!(
                "primary key {} already exists",
                user.id
            )));
        }

        users.insert(user.id, user.clone());
        Ok(())
    }
}

impl UserRepository for MockUserRepository {
    async fn get_by_id(&self, user_id: UserId) -> Result<Option<LocalUser>> {
        self.check_reads()?;
        let user = self.lock()?.get(&user_id).cloned();

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(user)
    }

    async fn get_by_external_id(&self, external_id: ExternalId) -> Result<Option<LocalUser>> {
        self.find(|user| user.external_id == Some(external_id))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<LocalUser>> {
        self.find(|user| user.username == username)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<LocalUser>> {
        self.find(|user| user.email == email)
    }

    async fn batch_get_by_ids(&self, user_ids: &[UserId]) -> Result<Vec<LocalUser>> {
        self.check_reads()?;
        let users = self.lock()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    async fn insert(&self, user: &LocalUser) -> Result<()> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.insert_now(user)
    }

    async fn update_token_fields(
        &self,
        user_id: UserId,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.token_updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_token_updates.load(Ordering::SeqCst) {
            return Err(IdentityBridgeError::StorageError(
                "injected token update failure".to_string(),
            ));
        }
        self.update(user_id, |user| {
            user.access_token = access_token.to_string();
            user.token_expires_at = Some(expires_at);
        })
    }

    async fn update_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        self.update(user_id, |user| user.last_login_at = Some(at))
    }

    async fn update_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        self.update(user_id, |user| user.status = status)
    }

    async fn update_email_status(&self, user_id: UserId, status: EmailStatus) -> Result<()> {
        self.update(user_id, |user| user.email_status = status)
    }

    async fn update_notice_status(&self, user_id: UserId, status: NoticeStatus) -> Result<()> {
        self.update(user_id, |user| user.notice_status = status)
    }

    async fn update_secret(&self, user_id: UserId, secret: &str) -> Result<()> {
        self.update(user_id, |user| user.local_secret = secret.to_string())
    }

    async fn update_email(&self, user_id: UserId, email: &str) -> Result<()> {
        self.update(user_id, |user| user.email = email.to_string())
    }

    async fn update_info(&self, user_id: UserId, update: &ProfileUpdate) -> Result<()> {
        self.update(user_id, |user| {
            user.username.clone_from(&update.username);
            user.display_name.clone_from(&update.display_name);
        })
    }

    async fn increase_answer_count(&self, user_id: UserId, amount: i64) -> Result<()> {
        self.update(user_id, |user| user.answer_count += amount)
    }

    async fn increase_question_count(&self, user_id: UserId, amount: i64) -> Result<()> {
        self.update(user_id, |user| user.question_count += amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(external_id: i64) -> LocalUser {
        LocalUser {
            id: UserId::new(),
            external_id: Some(ExternalId(external_id)),
            username: "ann".to_string(),
            display_name: "Ann".to_string(),
            email: "a@x.com".to_string(),
            local_secret: "secret".to_string(),
            access_token: "tok".to_string(),
            token_expires_at: None,
            status: UserStatus::Available,
            email_status: EmailStatus::Available,
            notice_status: NoticeStatus::On,
            answer_count: 0,
            question_count: 0,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_external_id_is_unique() {
        let repo = MockUserRepository::new();
        repo.insert(&user(42)).await.unwrap();

        let err = repo.insert(&user(42)).await.unwrap_err();

        assert_eq!(err, IdentityBridgeError::DuplicateIdentity { external_id: 42 });
        assert_eq!(repo.user_count(), 1);
        assert_eq!(repo.duplicate_rejections(), 1);
    }

    #[tokio::test]
    async fn test_users_without_external_id_do_not_collide() {
        let repo = MockUserRepository::new();
        let mut a = user(1);
        let mut b = user(2);
        a.external_id = None;
        b.external_id = None;

        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        assert_eq!(repo.user_count(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let repo = MockUserRepository::new();
        let err = repo
            .update_status(UserId::new(), UserStatus::Suspended)
            .await
            .unwrap_err();
        assert_eq!(err, IdentityBridgeError::UserNotFound);
    }

    #[tokio::test]
    async fn test_counters_accept_negative_amounts() {
        let repo = MockUserRepository::new();
        let u = user(7);
        repo.insert(&u).await.unwrap();

        repo.increase_answer_count(u.id, 3).await.unwrap();
        repo.increase_answer_count(u.id, -1).await.unwrap();
        repo.increase_question_count(u.id, 2).await.unwrap();

        let stored = repo.get_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(stored.answer_count, 2);
        assert_eq!(stored.question_count, 2);
    }

    #[tokio::test]
    async fn test_batch_get_skips_unknown_ids() {
        let repo = MockUserRepository::new();
        let a = user(1);
        let b = user(2);
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        let found = repo
            .batch_get_by_ids(&[a.id, UserId::new(), b.id])
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_race_next_insert_stores_competitor() {
        let repo = MockUserRepository::new();
        let u = user(42);
        repo.race_next_insert();

        let err = repo.insert(&u).await.unwrap_err();
        assert!(matches!(err, IdentityBridgeError::DuplicateIdentity { .. }));

        let winner = repo.get_by_external_id(ExternalId(42)).await.unwrap().unwrap();
        assert_ne!(winner.id, u.id);
        assert_eq!(repo.user_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let repo = MockUserRepository::new();
        let u = user(3);
        repo.insert(&u).await.unwrap();

        repo.set_fail_token_updates(true);
        assert!(matches!(
            repo.update_token_fields(u.id, "t", Utc::now()).await,
            Err(IdentityBridgeError::StorageError(_))
        ));
        assert!(repo.update_last_login(u.id, Utc::now()).await.is_ok());

        repo.set_fail_reads(true);
        assert!(repo.get_by_email("a@x.com").await.is_err());
    }
}
