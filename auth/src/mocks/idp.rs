//! Mock identity provider for testing.

use crate::error::{IdentityBridgeError, Result};
use crate::providers::{IdentityProvider, IdpLoginResult, IdpProfile};
use crate::state::ExternalId;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Mock identity provider.
///
/// Answers every call with a scripted result. By default login succeeds with
/// token `"mock_token"` valid for an hour and the profile is
/// `{id: 42, name: "Ann", email: "a@x.com"}`.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    login_result: Arc<Mutex<Result<IdpLoginResult>>>,
    profile_result: Arc<Mutex<Result<IdpProfile>>>,
    login_delay_ms: Arc<AtomicU64>,
    login_calls: Arc<AtomicUsize>,
    profile_calls: Arc<AtomicUsize>,
    last_bearer: Arc<Mutex<Option<String>>>,
}

impl MockIdentityProvider {
    /// Create a provider with the default script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            login_result: Arc::new(Mutex::new(Ok(IdpLoginResult {
                code: 0,
                message: "ok".to_string(),
                access_token: "mock_token".to_string(),
                token_type: "Bearer".to_string(),
                expires_in: 3600,
            }))),
            profile_result: Arc::new(Mutex::new(Ok(IdpProfile {
                code: 0,
                message: "ok".to_string(),
                id: ExternalId(42),
                name: "Ann".to_string(),
                email: "a@x.com".to_string(),
            }))),
            login_delay_ms: Arc::new(AtomicU64::new(0)),
            login_calls: Arc::new(AtomicUsize::new(0)),
            profile_calls: Arc::new(AtomicUsize::new(0)),
            last_bearer: Arc::new(Mutex::new(None)),
        }
    }

    /// Script the next logins to return `token` valid for `expires_in` seconds.
    pub fn set_token(&self, token: &str, expires_in: i64) {
        self.set_login_result(Ok(IdpLoginResult {
            code: 0,
            message: "ok".to_string(),
            access_token: token.to_string(),
            token_type: "Bearer".to_string(),
            expires_in,
        }));
    }

    /// Script the next profile fetches to return this principal.
    pub fn set_profile(&self, id: i64, name: &str, email: &str) {
        self.set_profile_result(Ok(IdpProfile {
            code: 0,
            message: "ok".to_string(),
            id: ExternalId(id),
            name: name.to_string(),
            email: email.to_string(),
        }));
    }

    /// Script the next logins to be rejected with `code`.
    pub fn reject_login(&self, code: i64, message: &str) {
        self.set_login_result(Err(IdentityBridgeError::IdpRejected {
            code,
            message: message.to_string(),
        }));
    }

    /// Script an arbitrary login result.
    pub fn set_login_result(&self, result: Result<IdpLoginResult>) {
        *self
            .login_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = result;
    }

    /// Script an arbitrary profile result.
    pub fn set_profile_result(&self, result: Result<IdpProfile>) {
        *self
            .profile_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = result;
    }

    /// Delay every login by `delay`.
    pub fn set_login_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.login_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of `login` calls.
    #[must_use]
    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_profile` calls.
    #[must_use]
    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    /// Bearer token passed to the most recent `fetch_profile`.
    #[must_use]
    pub fn last_bearer(&self) -> Option<String> {
        self.last_bearer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for MockIdentityProvider {
    async fn login(&self, _email: &str, _password: &str) -> Result<IdpLoginResult> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.login_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.login_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<IdpProfile> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_bearer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(access_token.to_string());

        self.profile_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
