//! HTTP identity provider tests against a mock server.

#![allow(clippy::unwrap_used)]

use identity_bridge::IdentityBridgeError;
use identity_bridge::config::IdpConfig;
use identity_bridge::providers::{HttpIdentityProvider, IdentityProvider};
use identity_bridge::state::ExternalId;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> HttpIdentityProvider {
    HttpIdentityProvider::new(
        IdpConfig::new(server.uri()).with_request_timeout(Duration::from_millis(300)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_login_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "p"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {"access_token": "tok1", "token_type": "Bearer", "expires_in": 3600}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let login = provider(&server).login("a@x.com", "p").await.unwrap();

    assert_eq!(login.code, 0);
    assert_eq!(login.access_token, "tok1");
    assert_eq!(login.token_type, "Bearer");
    assert_eq!(login.expires_in, 3600);
}

#[tokio::test]
async fn test_login_nonzero_code_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1,
            "msg": "wrong password",
            "data": null
        })))
        .mount(&server)
        .await;

    let err = provider(&server).login("a@x.com", "bad").await.unwrap_err();

    assert_eq!(
        err,
        IdentityBridgeError::IdpRejected {
            code: 1,
            message: "wrong password".to_string()
        }
    );
}

#[tokio::test]
async fn test_rejection_wins_over_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 40101,
            "msg": "unauthorized"
        })))
        .mount(&server)
        .await;

    let err = provider(&server).login("a@x.com", "p").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpRejected { code: 40101, .. }));
}

#[tokio::test]
async fn test_login_undecodable_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = provider(&server).login("a@x.com", "p").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpMalformedResponse(_)));
}

#[tokio::test]
async fn test_login_empty_token_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {"access_token": "", "token_type": "Bearer", "expires_in": 3600}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).login("a@x.com", "p").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpMalformedResponse(_)));
}

#[tokio::test]
async fn test_server_error_without_envelope_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = provider(&server).login("a@x.com", "p").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpUnreachable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_login_timeout_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 0, "msg": "ok", "data": {"access_token": "t", "expires_in": 1}}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = provider(&server).login("a@x.com", "p").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpUnreachable(_)));
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    let server = MockServer::start().await;
    let idp = provider(&server);
    drop(server);

    let err = idp.login("a@x.com", "p").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpUnreachable(_)));
}

#[tokio::test]
async fn test_fetch_profile_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("Authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {"id": 42, "name": "Ann", "email": "a@x.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = provider(&server).fetch_profile("tok1").await.unwrap();

    assert_eq!(profile.id, ExternalId(42));
    assert_eq!(profile.name, "Ann");
    assert_eq!(profile.email, "a@x.com");
}

#[tokio::test]
async fn test_fetch_profile_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 2,
            "msg": "token expired",
            "data": {}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).fetch_profile("stale").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpRejected { code: 2, .. }));
    assert!(err.is_user_error());
}

#[tokio::test]
async fn test_fetch_profile_without_id_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {"name": "Ann", "email": "a@x.com"}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).fetch_profile("tok1").await.unwrap_err();

    assert!(matches!(err, IdentityBridgeError::IdpMalformedResponse(_)));
}

#[tokio::test]
async fn test_custom_paths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {"access_token": "tok9", "token_type": "Bearer", "expires_in": 60}
        })))
        .mount(&server)
        .await;

    let idp = HttpIdentityProvider::new(
        IdpConfig::new(format!("{}/api/v1", server.uri())).with_login_path("/auth/login"),
    )
    .unwrap();

    assert_eq!(idp.login("a@x.com", "p").await.unwrap().access_token, "tok9");
}
