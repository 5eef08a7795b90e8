// Integration tests for `OAuthClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use x8000_api::{Error, OAuthClient};

async fn setup() -> (MockServer, OAuthClient) {
    let server = MockServer::start().await;
    let token_url = format!("{}/token", server.uri()).parse().unwrap();
    let client = OAuthClient::new(
        reqwest::Client::new(),
        token_url,
        "client-abc",
        SecretString::from("shh".to_string()),
    );
    (server, client)
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .and(body_string_contains("client_id=client-abc"))
        .and(body_string_contains("client_secret=shh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = client
        .refresh(&SecretString::from("old-refresh".to_string()))
        .await
        .unwrap();

    assert_eq!(grant.access_token.expose_secret(), "access-2");
    assert_eq!(
        grant.refresh_token.as_ref().map(|t| t.expose_secret().to_owned()),
        Some("refresh-2".to_owned())
    );
    assert_eq!(grant.expires_in, Duration::from_secs(3600));
}

#[tokio::test]
async fn test_code_exchange_without_rotation() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "expires_in": 1800
        })))
        .mount(&server)
        .await;

    let grant = client
        .exchange_code("the-code", "https://localhost/callback")
        .await
        .unwrap();
    assert!(grant.refresh_token.is_none());
    assert_eq!(grant.expires_in, Duration::from_secs(1800));
}

#[tokio::test]
async fn test_rejected_refresh_is_auth_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let err = client
        .refresh(&SecretString::from("revoked".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_missing_access_token_is_malformed() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "bearer" })))
        .mount(&server)
        .await;

    let err = client
        .refresh(&SecretString::from("r".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse { .. }));
}
