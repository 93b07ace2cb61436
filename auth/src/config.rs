//! Identity bridge configuration.
//!
//! Configuration values should be provided by the application. Each struct
//! has sensible defaults, `with_*` builder methods and a `from_env` loader.

use crate::error::{IdentityBridgeError, Result};
use std::time::Duration;

/// Identity provider transport configuration.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// Base URL of the identity provider (e.g., "https://idp.example.com").
    pub base_url: String,

    /// Path of the login endpoint, appended to `base_url`.
    ///
    /// Default: `/login`
    pub login_path: String,

    /// Path of the profile endpoint, appended to `base_url`.
    ///
    /// Default: `/me`
    pub profile_path: String,

    /// Upper bound for each outbound call, connect to last body byte.
    ///
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// User agent sent to the provider.
    pub user_agent: String,
}

impl IdpConfig {
    /// Create a new provider configuration.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the identity provider
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the login endpoint path.
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the profile endpoint path.
    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.profile_path = path.into();
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Full URL of the login endpoint.
    #[must_use]
    pub fn login_url(&self) -> String {
        join_url(&self.base_url, &self.login_path)
    }

    /// Full URL of the profile endpoint.
    #[must_use]
    pub fn profile_url(&self) -> String {
        join_url(&self.base_url, &self.profile_path)
    }

    /// Check the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the base URL is empty or not HTTP(S), or if
    /// the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(IdentityBridgeError::InvalidConfig(
                "identity provider base URL is empty".to_string(),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(IdentityBridgeError::InvalidConfig(format!(
                "identity provider base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(IdentityBridgeError::InvalidConfig(
                "identity provider request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// - `IDP_BASE_URL` (required)
    /// - `IDP_LOGIN_PATH` (default `/login`)
    /// - `IDP_PROFILE_PATH` (default `/me`)
    /// - `IDP_TIMEOUT_SECS` (default 10)
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `IDP_BASE_URL` is missing or a value fails
    /// to parse or validate.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("IDP_BASE_URL").map_err(|_| {
            IdentityBridgeError::InvalidConfig("IDP_BASE_URL is not set".to_string())
        })?;

        let mut config = Self::new(base_url);
        if let Ok(path) = std::env::var("IDP_LOGIN_PATH") {
            config.login_path = path;
        }
        if let Ok(path) = std::env::var("IDP_PROFILE_PATH") {
            config.profile_path = path;
        }
        if let Some(secs) = env_u64("IDP_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            login_path: "/login".to_string(),
            profile_path: "/me".to_string(),
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("identity-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Session cache configuration.
#[derive(Debug, Clone)]
pub struct SessionCacheConfig {
    /// How long a cache entry may be served before it must be re-derived.
    ///
    /// Default: 5 minutes
    pub ttl: chrono::Duration,

    /// How often the background sweeper purges expired entries.
    ///
    /// Default: 1 minute
    pub sweep_interval: Duration,
}

impl SessionCacheConfig {
    /// Set the entry time-to-live.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `SESSION_CACHE_TTL_SECS` (default 300)
    /// - `SESSION_CACHE_SWEEP_SECS` (default 60)
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a value does not parse, is zero, or the ttl
    /// does not fit a timestamp.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = env_u64("SESSION_CACHE_TTL_SECS")? {
            config.ttl = ttl_from_secs(secs)?;
        }
        if let Some(secs) = env_u64("SESSION_CACHE_SWEEP_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if config.ttl <= chrono::Duration::zero() || config.sweep_interval.is_zero() {
            return Err(IdentityBridgeError::InvalidConfig(
                "session cache ttl and sweep interval must be non-zero".to_string(),
            ));
        }
        Ok(config)
    }
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::minutes(5),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// User synchronizer configuration.
#[derive(Debug, Clone)]
pub struct SynchronizerConfig {
    /// Lookup/insert rounds before a provisioning race is reported as a
    /// storage error.
    ///
    /// Default: 3
    pub max_provision_attempts: u32,

    /// Length of the generated local secret.
    ///
    /// Default: 32
    pub local_secret_len: usize,
}

impl SynchronizerConfig {
    /// Set the number of provisioning attempts (at least one).
    #[must_use]
    pub const fn with_max_provision_attempts(mut self, attempts: u32) -> Self {
        self.max_provision_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Set the local secret length.
    #[must_use]
    pub const fn with_local_secret_len(mut self, len: usize) -> Self {
        self.local_secret_len = len;
        self
    }
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            max_provision_attempts: 3,
            local_secret_len: 32,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Convert a configured ttl in seconds, rejecting values that would overflow
/// an expiry computed from the current time.
fn ttl_from_secs(secs: u64) -> Result<chrono::Duration> {
    let too_large =
        || IdentityBridgeError::InvalidConfig(format!("SESSION_CACHE_TTL_SECS {secs} is too large"));

    let ttl = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(too_large)?;
    chrono::Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(too_large)?;
    Ok(ttl)
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| IdentityBridgeError::InvalidConfig(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}
