// ── OAuth2 token endpoint ──
//
// Refresh-token and authorization-code grants against the Legrand
// partner login service. The returned refresh token rotates on every
// grant; callers must persist the newest one.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::lenient;

/// Default token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://partners-login.eliotbylegrand.com/token";

/// Attribution for failures of the token endpoint itself.
const TOKEN_SOURCE: &str = "oauth";

/// Lifetime assumed when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

/// Bearer token presented on every API call.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl From<SecretString> for AccessToken {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

/// Result of a successful grant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    /// `None` when the server did not rotate the refresh token.
    pub refresh_token: Option<SecretString>,
    /// Server-declared lifetime, relative to the moment the response arrived.
    pub expires_in: Duration,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    expires_in: Option<u64>,
}

/// Client for the OAuth token endpoint.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
}

impl OAuthClient {
    /// `http` should be the same client the `ApiClient` was built with.
    pub fn new(
        http: reqwest::Client,
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, Error> {
        debug!("refreshing access token");
        self.grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
        ])
        .await
    }

    /// Exchange an authorization code obtained from the consent redirect.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, Error> {
        debug!("exchanging authorization code");
        self.grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn grant(&self, params: &[(&str, &str)]) -> Result<TokenGrant, Error> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.client_id.as_str()));
        form.push(("client_secret", self.client_secret.expose_secret()));

        let resp = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::TransientNetwork {
                source_id: TOKEN_SOURCE.into(),
                attempts: 1,
                message: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_failure(status, body));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::MalformedResponse {
                source_id: TOKEN_SOURCE.into(),
                message: e.to_string(),
                body: body.clone(),
            })?;

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::MalformedResponse {
                source_id: TOKEN_SOURCE.into(),
                message: "missing access_token".into(),
                body,
            })?;

        Ok(TokenGrant {
            access_token: AccessToken::new(access_token),
            refresh_token: parsed
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_in: parsed
                .expires_in
                .map_or(DEFAULT_EXPIRES_IN, Duration::from_secs),
        })
    }
}

fn classify_failure(status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            source_id: TOKEN_SOURCE.into(),
            retry_after: None,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth {
                status: status.as_u16(),
                message: body,
            }
        }
        s if s.is_server_error() => Error::TransientNetwork {
            source_id: TOKEN_SOURCE.into(),
            attempts: 1,
            message: format!("HTTP {s}"),
        },
        s => Error::Api {
            source_id: TOKEN_SOURCE.into(),
            status: s.as_u16(),
            message: body,
        },
    }
}
