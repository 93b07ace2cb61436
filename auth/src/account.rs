//! Account state changes that keep the session cache coherent.
//!
//! Every write to an authorization-relevant column (account status, email
//! status) goes through here so the cached projection is dropped right after
//! the store accepts the change. A failed write leaves the cache untouched.

use crate::cache::SessionCache;
use crate::error::Result;
use crate::providers::UserRepository;
use crate::state::{EmailStatus, UserId, UserStatus};
use std::sync::Arc;

/// Account state service.
#[derive(Debug)]
pub struct AccountService<U: UserRepository> {
    users: U,
    cache: Arc<SessionCache>,
}

impl<U: UserRepository> AccountService<U> {
    /// Create a service writing to `users` and invalidating `cache`.
    #[must_use]
    pub const fn new(users: U, cache: Arc<SessionCache>) -> Self {
        Self { users, cache }
    }

    /// Suspend the account.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `StorageError` from the store.
    pub async fn suspend(&self, user_id: UserId) -> Result<()> {
        self.set_status(user_id, UserStatus::Suspended).await
    }

    /// Soft-delete the account.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `StorageError` from the store.
    pub async fn delete(&self, user_id: UserId) -> Result<()> {
        self.set_status(user_id, UserStatus::Deleted).await
    }

    /// Reactivate the account.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `StorageError` from the store.
    pub async fn activate(&self, user_id: UserId) -> Result<()> {
        self.set_status(user_id, UserStatus::Available).await
    }

    /// Mark the email address as verified.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `StorageError` from the store.
    pub async fn confirm_email(&self, user_id: UserId) -> Result<()> {
        self.set_email_status(user_id, EmailStatus::Available).await
    }

    /// Require the email address to be verified again.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `StorageError` from the store.
    pub async fn require_email_verification(&self, user_id: UserId) -> Result<()> {
        self.set_email_status(user_id, EmailStatus::ToBeVerified).await
    }

    /// Record a login at the cache clock's current time.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` or `StorageError` from the store.
    pub async fn record_login(&self, user_id: UserId) -> Result<()> {
        let now = self.cache.clock().now();
        self.users.update_last_login(user_id, now).await
    }

    async fn set_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        self.users.update_status(user_id, status).await?;
        self.cache.invalidate(&user_id);
        tracing::info!(user_id = %user_id, status = ?status, "Account status changed");
        Ok(())
    }

    async fn set_email_status(&self, user_id: UserId, status: EmailStatus) -> Result<()> {
        self.users.update_email_status(user_id, status).await?;
        self.cache.invalidate(&user_id);
        tracing::info!(user_id = %user_id, email_status = ?status, "Email status changed");
        Ok(())
    }
}
