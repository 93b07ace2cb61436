//! Error types for identity bridge operations.

use thiserror::Error;

/// Result type alias for identity bridge operations.
pub type Result<T> = std::result::Result<T, IdentityBridgeError>;

/// Error taxonomy for the identity bridge.
///
/// Provider failures are split three ways (unreachable, rejected, malformed)
/// so callers can decide between retrying, reporting bad credentials, and
/// flagging a broken upstream integration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityBridgeError {
    // ═══════════════════════════════════════════════════════════
    // Identity Provider Errors
    // ═══════════════════════════════════════════════════════════

    /// The identity provider could not be reached (network failure or timeout).
    #[error("Identity provider unreachable: {0}")]
    IdpUnreachable(String),

    /// The identity provider answered with a non-zero result code.
    #[error("Identity provider rejected the request (code {code}): {message}")]
    IdpRejected {
        /// Result code reported by the provider
        code: i64,
        /// Message reported by the provider
        message: String,
    },

    /// The identity provider response could not be decoded.
    #[error("Malformed identity provider response: {0}")]
    IdpMalformedResponse(String),

    // ═══════════════════════════════════════════════════════════
    // Storage Errors
    // ═══════════════════════════════════════════════════════════

    /// User store operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Another row already holds this external identity.
    ///
    /// Only returned by `UserRepository::insert`; the synchronizer recovers
    /// from it and never surfaces it to callers.
    #[error("External identity {external_id} is already linked")]
    DuplicateIdentity {
        /// The contested external ID
        external_id: i64,
    },

    /// No user exists with the given key.
    #[error("User not found")]
    UserNotFound,

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Configuration is missing or invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IdentityBridgeError {
    /// Returns `true` if the operation may succeed when retried unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// # use identity_bridge::IdentityBridgeError;
    /// assert!(IdentityBridgeError::IdpUnreachable("timeout".into()).is_retryable());
    /// assert!(!IdentityBridgeError::IdpRejected { code: 1, message: "bad".into() }.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::IdpUnreachable(_) | Self::StorageError(_))
    }

    /// Returns `true` if this error is due to the caller's credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// # use identity_bridge::IdentityBridgeError;
    /// assert!(IdentityBridgeError::IdpRejected { code: 1, message: "bad".into() }.is_user_error());
    /// assert!(!IdentityBridgeError::UserNotFound.is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::IdpRejected { .. })
    }

    /// Returns `true` if the identity provider misbehaved or was unavailable.
    #[must_use]
    pub const fn is_upstream_failure(&self) -> bool {
        matches!(self, Self::IdpUnreachable(_) | Self::IdpMalformedResponse(_))
    }
}
