//! User synchronizer.
//!
//! Turns a successful identity provider login into exactly one local user.
//!
//! # Flow
//!
//! ```text
//! login ──▶ expiry = now + expires_in ──▶ fetch_profile
//!                                              │
//!                    ┌─────────────────────────┘
//!                    ▼
//!         get_by_external_id ── found ──▶ update_token_fields (best effort)
//!                    │
//!                  absent
//!                    ▼
//!                 insert ── DuplicateIdentity ──▶ lookup again
//! ```
//!
//! Uniqueness of the external ID is enforced by the store. Concurrent first
//! logins for the same principal all race to insert; the losers see
//! `DuplicateIdentity`, re-run the lookup and return the winner's row.
//!
//! Dropping the future returned by
//! [`UserSynchronizer::authenticate_via_idp`] aborts any in-flight provider
//! call. Nothing is written before both provider calls have succeeded.

use crate::cache::SessionCache;
use crate::config::SynchronizerConfig;
use crate::constants::{login_outcomes, metric_names};
use crate::environment::{Clock, SystemClock};
use crate::error::{IdentityBridgeError, Result};
use crate::providers::{IdentityProvider, IdpLoginResult, IdpProfile, UserRepository};
use crate::state::{EmailStatus, LocalUser, NoticeStatus, UserId, UserStatus};
use crate::utils::{generate_local_secret, username_from_profile};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// How a successful authentication was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Refreshed,
    /// Lost the insert race to a concurrent first login and returned the
    /// winner's row.
    Recovered,
}

impl Outcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Created => login_outcomes::CREATED,
            Self::Refreshed => login_outcomes::REFRESHED,
            Self::Recovered => login_outcomes::RECOVERED,
        }
    }
}

/// Authenticates against the identity provider and keeps local users in sync.
pub struct UserSynchronizer<P, U>
where
    P: IdentityProvider,
    U: UserRepository,
{
    idp: P,
    users: U,
    clock: Arc<dyn Clock>,
    config: SynchronizerConfig,
    cache: Option<Arc<SessionCache>>,
}

impl<P, U> UserSynchronizer<P, U>
where
    P: IdentityProvider,
    U: UserRepository,
{
    /// Create a synchronizer with the system clock and default settings.
    #[must_use]
    pub fn new(idp: P, users: U) -> Self {
        Self {
            idp,
            users,
            clock: Arc::new(SystemClock),
            config: SynchronizerConfig::default(),
            cache: None,
        }
    }

    /// Use `clock` for token expiry and timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_config(mut self, config: SynchronizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Invalidate `cache` whenever a user's token is refreshed.
    #[must_use]
    pub fn with_session_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The identity provider.
    #[must_use]
    pub const fn idp(&self) -> &P {
        &self.idp
    }

    /// The user store.
    #[must_use]
    pub const fn users(&self) -> &U {
        &self.users
    }

    /// Authenticate `email`/`password` with the identity provider and return
    /// the matching local user, creating it on first login.
    ///
    /// The `outcome` label of the login counter is `created`, `refreshed`,
    /// or `recovered` when a concurrent first login won the insert race.
    ///
    /// On a repeat login only the token and its expiry are updated. That
    /// update is best effort: if it fails the error is logged and counted,
    /// and the returned user still carries the new token.
    ///
    /// # Errors
    ///
    /// - `IdpUnreachable`, `IdpRejected`, `IdpMalformedResponse` from the
    ///   provider, unchanged
    /// - `StorageError` if the lookup or insert fails, or if provisioning
    ///   keeps losing uniqueness races
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn authenticate_via_idp(&self, email: &str, password: &str) -> Result<LocalUser> {
        let result = self.authenticate(email, password).await;

        let outcome = match &result {
            Ok((_, outcome)) => outcome.label(),
            Err(IdentityBridgeError::IdpRejected { .. }) => login_outcomes::REJECTED,
            Err(IdentityBridgeError::IdpUnreachable(_)) => login_outcomes::UNREACHABLE,
            Err(IdentityBridgeError::IdpMalformedResponse(_)) => login_outcomes::MALFORMED,
            Err(_) => login_outcomes::STORAGE_ERROR,
        };
        metrics::counter!(metric_names::LOGIN, "outcome" => outcome).increment(1);

        result.map(|(user, _)| user)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<(LocalUser, Outcome)> {
        let login = self.idp.login(email, password).await?;
        let expires_at = self.expiry_from(&login)?;

        let profile = self.idp.fetch_profile(&login.access_token).await?;

        self.link(&profile, &login.access_token, expires_at).await
    }

    /// Absolute token expiry, measured from when the login answered.
    fn expiry_from(&self, login: &IdpLoginResult) -> Result<DateTime<Utc>> {
        Duration::try_seconds(login.expires_in)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| {
                IdentityBridgeError::IdpMalformedResponse(format!(
                    "login: expires_in {} out of range",
                    login.expires_in
                ))
            })
    }

    /// Find or create the local user for `profile`.
    async fn link(
        &self,
        profile: &IdpProfile,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(LocalUser, Outcome)> {
        let attempts = self.config.max_provision_attempts.max(1);
        let mut found = Outcome::Refreshed;

        for attempt in 1..=attempts {
            if let Some(existing) = self.users.get_by_external_id(profile.id).await? {
                let user = self.refresh_token(existing, access_token, expires_at).await;
                return Ok((user, found));
            }

            let user = self.new_user(profile, access_token, expires_at);
            match self.users.insert(&user).await {
                Ok(()) => {
                    tracing::info!(
                        user_id = %user.id,
                        external_id = %profile.id,
                        "Provisioned local user"
                    );
                    return Ok((user, Outcome::Created));
                }
                Err(IdentityBridgeError::DuplicateIdentity { external_id }) => {
                    found = Outcome::Recovered;
                    metrics::counter!(metric_names::PROVISION_DUPLICATE).increment(1);
                    tracing::warn!(
                        external_id,
                        attempt,
                        "Lost provisioning race, looking up the winner"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(external_id = %profile.id, attempts, "Provisioning did not converge");
        Err(IdentityBridgeError::StorageError(format!(
            "external identity {} still unresolved after {attempts} provisioning attempts",
            profile.id
        )))
    }

    /// Write the new token to an existing user, best effort.
    async fn refresh_token(
        &self,
        mut user: LocalUser,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> LocalUser {
        match self
            .users
            .update_token_fields(user.id, access_token, expires_at)
            .await
        {
            Ok(()) => {
                if let Some(cache) = &self.cache {
                    cache.invalidate(&user.id);
                }
            }
            Err(e) => {
                metrics::counter!(metric_names::TOKEN_REFRESH_FAILED).increment(1);
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "Token refresh failed, returning unsaved token"
                );
            }
        }

        user.access_token = access_token.to_string();
        user.token_expires_at = Some(expires_at);
        user
    }

    fn new_user(&self, profile: &IdpProfile, access_token: &str, expires_at: DateTime<Utc>) -> LocalUser {
        LocalUser {
            id: UserId::new(),
            external_id: Some(profile.id),
            username: username_from_profile(&profile.name, &profile.email),
            display_name: profile.name.clone(),
            email: profile.email.clone(),
            local_secret: generate_local_secret(self.config.local_secret_len),
            access_token: access_token.to_string(),
            token_expires_at: Some(expires_at),
            status: UserStatus::Available,
            email_status: EmailStatus::Available,
            notice_status: NoticeStatus::default(),
            answer_count: 0,
            question_count: 0,
            last_login_at: None,
            created_at: self.clock.now(),
        }
    }
}

impl<P, U> std::fmt::Debug for UserSynchronizer<P, U>
where
    P: IdentityProvider,
    U: UserRepository,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSynchronizer")
            .field("config", &self.config)
            .field("session_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
