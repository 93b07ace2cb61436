//! HTTP identity provider implementation.

use crate::config::IdpConfig;
use crate::error::{IdentityBridgeError, Result};
use crate::providers::{IdentityProvider, IdpLoginResult, IdpProfile};
use crate::state::ExternalId;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identity provider reached over HTTP with JSON envelopes.
///
/// Implements the `IdentityProvider` trait for a provider exposing:
///
/// - `POST {base}/login` with body `{email, password}`, answering
///   `{code, msg, data: {access_token, token_type, expires_in}}`
/// - `GET {base}/me` with `Authorization: Bearer <token>`, answering
///   `{code, msg, data: {id, name, email}}`
///
/// A non-zero `code` is a rejection whatever the HTTP status. Every call is
/// bounded by [`IdpConfig::request_timeout`]; dropping the future cancels the
/// in-flight request.
///
/// # Example
///
/// ```no_run
/// use identity_bridge::config::IdpConfig;
/// use identity_bridge::providers::HttpIdentityProvider;
///
/// # fn example() -> identity_bridge::Result<()> {
/// let idp = HttpIdentityProvider::new(IdpConfig::new("https://idp.example.com"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
    /// Endpoint and timeout settings.
    config: IdpConfig,

    /// HTTP client for making requests.
    http_client: Client,
}

impl HttpIdentityProvider {
    /// Create a new HTTP identity provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: IdpConfig) -> Result<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                IdentityBridgeError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// The configuration this provider was built with.
    #[must_use]
    pub const fn config(&self) -> &IdpConfig {
        &self.config
    }

    /// Send a request and decode the JSON envelope.
    ///
    /// The body is decoded whatever the HTTP status. An undecodable body
    /// behind a 5xx status counts as an outage rather than a protocol error.
    async fn exchange<T>(&self, request: RequestBuilder, endpoint: &'static str) -> Result<Envelope<T>>
    where
        T: DeserializeOwned + Send,
    {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, &e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(endpoint, &e))?;

        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_server_error() => {
                tracing::error!(endpoint, %status, error = %e, "Identity provider returned a server error");
                Err(IdentityBridgeError::IdpUnreachable(format!(
                    "{endpoint} returned HTTP {status}"
                )))
            }
            Err(e) => {
                tracing::error!(endpoint, %status, error = %e, "Identity provider response could not be decoded");
                Err(IdentityBridgeError::IdpMalformedResponse(format!(
                    "{endpoint}: {e}"
                )))
            }
        }
    }

    fn transport_error(&self, endpoint: &'static str, error: &reqwest::Error) -> IdentityBridgeError {
        if error.is_timeout() {
            tracing::warn!(
                endpoint,
                timeout_ms = u64::try_from(self.config.request_timeout.as_millis()).unwrap_or(u64::MAX),
                "Identity provider call timed out"
            );
            return IdentityBridgeError::IdpUnreachable(format!(
                "{endpoint} timed out after {:?}",
                self.config.request_timeout
            ));
        }

        tracing::warn!(endpoint, error = %error, "Identity provider call failed");
        IdentityBridgeError::IdpUnreachable(format!("{endpoint}: {error}"))
    }
}

impl IdentityProvider for HttpIdentityProvider {
    async fn login(&self, email: &str, password: &str) -> Result<IdpLoginResult> {
        let request = self
            .http_client
            .post(self.config.login_url())
            .json(&LoginRequest { email, password });

        let envelope: Envelope<LoginData> = self.exchange(request, "login").await?;
        let Success { msg, data } = envelope.into_success("login")?;

        if data.access_token.is_empty() {
            return Err(IdentityBridgeError::IdpMalformedResponse(
                "login: empty access_token".to_string(),
            ));
        }
        if data.expires_in < 0 {
            return Err(IdentityBridgeError::IdpMalformedResponse(format!(
                "login: negative expires_in {}",
                data.expires_in
            )));
        }

        Ok(IdpLoginResult {
            code: 0,
            message: msg,
            access_token: data.access_token,
            token_type: data.token_type,
            expires_in: data.expires_in,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<IdpProfile> {
        let request = self
            .http_client
            .get(self.config.profile_url())
            .bearer_auth(access_token);

        let envelope: Envelope<ProfileData> = self.exchange(request, "profile").await?;
        let Success { msg, data } = envelope.into_success("profile")?;

        if data.id == 0 {
            return Err(IdentityBridgeError::IdpMalformedResponse(
                "profile: missing id".to_string(),
            ));
        }

        Ok(IdpProfile {
            code: 0,
            message: msg,
            id: ExternalId(data.id),
            name: data.name,
            email: data.email,
        })
    }
}

/// Login request body.
#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Response envelope shared by both endpoints.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// Zero on success.
    code: i64,

    #[serde(default)]
    msg: String,

    /// Absent or null on most rejections.
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap a successful envelope, carrying the message into the payload.
    fn into_success(self, endpoint: &'static str) -> Result<Success<T>> {
        if self.code != 0 {
            tracing::warn!(endpoint, code = self.code, msg = %self.msg, "Identity provider rejected the request");
            return Err(IdentityBridgeError::IdpRejected {
                code: self.code,
                message: self.msg,
            });
        }

        let data = self.data.ok_or_else(|| {
            IdentityBridgeError::IdpMalformedResponse(format!("{endpoint}: missing data"))
        })?;

        Ok(Success { msg: self.msg, data })
    }
}

/// Successful envelope payload plus the provider message.
struct Success<T> {
    msg: String,
    data: T,
}

/// Login payload.
///
/// Fields default so that rejection envelopes carrying `data: {}` still decode.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginData {
    access_token: String,
    token_type: String,
    expires_in: i64,
}

/// Profile payload.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileData {
    id: i64,
    name: String,
    email: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_provider_creation() {
        let idp = HttpIdentityProvider::new(
            IdpConfig::new("https://idp.example.com").with_request_timeout(Duration::from_secs(3)),
        )
        .unwrap();

        assert_eq!(idp.config().login_url(), "https://idp.example.com/login");
        assert_eq!(idp.config().request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = HttpIdentityProvider::new(IdpConfig::new(""));
        assert!(matches!(result, Err(IdentityBridgeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejection_envelope_with_empty_data_decodes() {
        let envelope: Envelope<LoginData> =
            serde_json::from_str(r#"{"code":1,"msg":"bad password","data":{}}"#).unwrap();
        let err = envelope.into_success("login").err().unwrap();
        assert_eq!(
            err,
            IdentityBridgeError::IdpRejected {
                code: 1,
                message: "bad password".to_string()
            }
        );
    }

    #[test]
    fn test_success_without_data_is_malformed() {
        let envelope: Envelope<ProfileData> = serde_json::from_str(r#"{"code":0,"msg":"ok"}"#).unwrap();
        assert!(matches!(
            envelope.into_success("profile"),
            Err(IdentityBridgeError::IdpMalformedResponse(_))
        ));
    }

    #[test]
    fn test_envelope_without_code_fails_to_decode() {
        let result = serde_json::from_str::<Envelope<LoginData>>(r#"{"msg":"hello"}"#);
        assert!(result.is_err());
    }
}
