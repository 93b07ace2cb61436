//! User repository trait.

use crate::error::Result;
use crate::state::{
    EmailStatus, ExternalId, LocalUser, NoticeStatus, ProfileUpdate, UserId, UserStatus,
};
use chrono::{DateTime, Utc};

/// Local user store.
///
/// This trait abstracts over the persistent user table (PostgreSQL in
/// production, in-memory in tests). Lookups return `Ok(None)` when no row
/// matches; errors are reserved for storage failures.
///
/// # Implementation Notes
///
/// - `external_id` must be unique across rows; enforce it with a store
///   constraint, not an application lock
/// - A uniqueness violation on `external_id` during `insert` must surface as
///   `IdentityBridgeError::DuplicateIdentity`
/// - Updates against an unknown ID return `IdentityBridgeError::UserNotFound`
pub trait UserRepository: Send + Sync {
    // ═══════════════════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════════════════

    /// Get user by internal ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_by_id(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Option<LocalUser>>> + Send;

    /// Get user by identity provider ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_by_external_id(
        &self,
        external_id: ExternalId,
    ) -> impl std::future::Future<Output = Result<Option<LocalUser>>> + Send;

    /// Get user by username.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<LocalUser>>> + Send;

    /// Get user by email.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<LocalUser>>> + Send;

    /// Get several users at once. Unknown IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn batch_get_by_ids(
        &self,
        user_ids: &[UserId],
    ) -> impl std::future::Future<Output = Result<Vec<LocalUser>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The external ID is already linked → `DuplicateIdentity`
    /// - The query fails → `StorageError`
    fn insert(
        &self,
        user: &LocalUser,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace the bearer token and its expiry. Touches no other column.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_token_fields(
        &self,
        user_id: UserId,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Record the last login time.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_last_login(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Change the account status.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_status(
        &self,
        user_id: UserId,
        status: UserStatus,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Change the email verification status.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_email_status(
        &self,
        user_id: UserId,
        status: EmailStatus,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Change the notification preference.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_notice_status(
        &self,
        user_id: UserId,
        status: NoticeStatus,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace the local secret.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_secret(
        &self,
        user_id: UserId,
        secret: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace the email address.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_email(
        &self,
        user_id: UserId,
        email: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace username and display name.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn update_info(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Counters
    // ═══════════════════════════════════════════════════════════════════════

    /// Add `amount` (may be negative) to the answer counter.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn increase_answer_count(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Add `amount` (may be negative) to the question counter.
    ///
    /// # Errors
    ///
    /// Returns error if the user does not exist or the query fails.
    fn increase_question_count(
        &self,
        user_id: UserId,
        amount: i64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
