//! Identity provider trait.

use crate::error::Result;
use crate::state::ExternalId;

/// Identity provider transport.
///
/// Two calls against the external provider: exchange credentials for a
/// bearer token, then fetch the principal's profile with that token.
///
/// # Implementation Notes
///
/// - A non-zero provider result code maps to `IdpRejected`
/// - Network failures and timeouts map to `IdpUnreachable`
/// - Undecodable bodies map to `IdpMalformedResponse`
/// - No retries; retry policy belongs to the caller
/// - Dropping the returned future must abort the outbound request
pub trait IdentityProvider: Send + Sync {
    /// Exchange email and password for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The provider cannot be reached in time → `IdpUnreachable`
    /// - The provider rejects the credentials → `IdpRejected`
    /// - The response cannot be decoded → `IdpMalformedResponse`
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<IdpLoginResult>> + Send;

    /// Fetch the profile of the principal owning `access_token`.
    ///
    /// # Errors
    ///
    /// Same three-way split as [`IdentityProvider::login`].
    fn fetch_profile(
        &self,
        access_token: &str,
    ) -> impl std::future::Future<Output = Result<IdpProfile>> + Send;
}

/// Result of a successful token exchange.
///
/// Ephemeral: only the token and its computed absolute expiry are persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct IdpLoginResult {
    /// Provider result code (always 0 on success).
    pub code: i64,

    /// Provider message.
    pub message: String,

    /// Bearer token.
    pub access_token: String,

    /// Token type (typically "Bearer").
    pub token_type: String,

    /// Seconds until the token expires.
    pub expires_in: i64,
}

impl std::fmt::Debug for IdpLoginResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpLoginResult")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Profile returned by the provider.
///
/// Ephemeral: mapped into `LocalUser` fields when the user is first created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpProfile {
    /// Provider result code (always 0 on success).
    pub code: i64,

    /// Provider message.
    pub message: String,

    /// Provider's stable numeric ID for the principal.
    pub id: ExternalId,

    /// Display name.
    pub name: String,

    /// Email address.
    pub email: String,
}
