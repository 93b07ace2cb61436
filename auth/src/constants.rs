//! Identity bridge constants.
//!
//! Metric names and label values emitted through the `metrics` facade.

/// Metric names.
pub mod metric_names {
    /// Counter of `authenticate_via_idp` outcomes, labelled `outcome`.
    pub const LOGIN: &str = "identity_bridge.login";

    /// Counter of swallowed best-effort token refresh failures.
    pub const TOKEN_REFRESH_FAILED: &str = "identity_bridge.token_refresh.failed";

    /// Counter of provisioning races recovered by re-querying.
    pub const PROVISION_DUPLICATE: &str = "identity_bridge.provision.duplicate";

    /// Counter of session cache lookups, labelled `result`.
    pub const SESSION_CACHE: &str = "identity_bridge.session_cache";

    /// Counter of explicit session cache invalidations.
    pub const SESSION_CACHE_INVALIDATED: &str = "identity_bridge.session_cache.invalidated";
}

/// Values of the `outcome` label on [`metric_names::LOGIN`].
pub mod login_outcomes {
    /// A new local user was provisioned.
    pub const CREATED: &str = "created";

    /// An existing local user got a fresh token.
    pub const REFRESHED: &str = "refreshed";

    /// A concurrent first login won the insert race and its user was
    /// returned.
    pub const RECOVERED: &str = "recovered";

    /// The provider rejected the credentials.
    pub const REJECTED: &str = "rejected";

    /// The provider could not be reached.
    pub const UNREACHABLE: &str = "unreachable";

    /// The provider answered with an undecodable body.
    pub const MALFORMED: &str = "malformed";

    /// The local store failed.
    pub const STORAGE_ERROR: &str = "storage_error";
}

/// Values of the `result` label on [`metric_names::SESSION_CACHE`].
pub mod cache_results {
    /// Live entry served.
    pub const HIT: &str = "hit";

    /// No entry.
    pub const MISS: &str = "miss";

    /// Entry found past its expiry and evicted.
    pub const EXPIRED: &str = "expired";
}
