// ── Smarther API client ──
//
// Issues authenticated calls over one shared reqwest::Client, retries
// transient failures on a bounded exponential schedule, and classifies
// every other outcome into a typed `Error` without retrying.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::auth::AccessToken;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::metrics::{ApiMetrics, MetricsSnapshot, Outcome};
use crate::models::{
    Chronothermostat, Plant, PlantsResponse, Program, ProgramListResponse, StatusResponse,
    StatusUpdate, SubscribeRequest, SubscribeResponse, Subscription, TopologyPlant,
    TopologyResponse,
};
use crate::transport::{RetryPolicy, TransportConfig};

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://api.developer.legrand.com";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// A successful (2xx/204) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed body; `Null` when the body was empty.
    pub body: serde_json::Value,
    /// Raw body text, kept for diagnostics.
    pub text: String,
}

/// How a single attempt ended when it did not succeed.
enum Failure {
    /// Timeout, connection error, or 5xx.
    Retryable(String),
    Fatal(Error),
}

/// Client for the Smarther v2.0 REST API.
///
/// Cheap to clone; clones share the connection pool, the in-flight
/// limit, and the request counters.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    subscription_key: SecretString,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    metrics: Arc<ApiMetrics>,
}

impl ApiClient {
    /// Create a client around an existing `reqwest::Client`.
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        subscription_key: SecretString,
        transport: &TransportConfig,
    ) -> Self {
        Self {
            http,
            base_url,
            subscription_key,
            retry: transport.retry,
            permits: Arc::new(Semaphore::new(transport.max_in_flight.max(1))),
            metrics: Arc::new(ApiMetrics::default()),
        }
    }

    /// Build the HTTP client from `transport` and wrap it.
    pub fn from_transport(
        base_url: Url,
        subscription_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::new(http, base_url, subscription_key, transport))
    }

    /// The shared HTTP client, for building an `OAuthClient` on the same pool.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Request counters since construction.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ── Generic call ─────────────────────────────────────────────────

    /// Issue one logical call, retrying transient failures.
    ///
    /// 429 and 401/403 return immediately. The retry sequence always runs
    /// to completion before this returns.
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        method: Method,
        payload: Option<&serde_json::Value>,
        token: &AccessToken,
    ) -> Result<ApiResponse, Error> {
        let url = self.base_url.join(&endpoint.path())?;
        let source_id = endpoint.source_id();

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::TransientNetwork {
                source_id: source_id.to_owned(),
                attempts: 0,
                message: e.to_string(),
            })?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(%method, path = url.path(), attempt, "API request");

            match self.send_once(&url, &method, payload, token, source_id).await {
                Ok(resp) => {
                    self.metrics.record(Outcome::Success);
                    return Ok(resp);
                }
                Err(Failure::Fatal(err)) => {
                    self.metrics.record(match &err {
                        Error::RateLimited { .. } => Outcome::RateLimited,
                        Error::Auth { .. } => Outcome::AuthFailure,
                        _ => Outcome::OtherFailure,
                    });
                    return Err(err);
                }
                Err(Failure::Retryable(message)) => {
                    self.metrics.record(Outcome::OtherFailure);
                    if attempt > self.retry.max_retries {
                        warn!(source_id, attempts = attempt, %message, "retries exhausted");
                        return Err(Error::TransientNetwork {
                            source_id: source_id.to_owned(),
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        source_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %message,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once(
        &self,
        url: &Url,
        method: &Method,
        payload: Option<&serde_json::Value>,
        token: &AccessToken,
        source_id: &str,
    ) -> Result<ApiResponse, Failure> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .header(
                SUBSCRIPTION_KEY_HEADER,
                self.subscription_key.expose_secret(),
            );
        if let Some(body) = payload {
            request = request.header(CONTENT_TYPE, "application/json").json(body);
        }

        self.metrics.record_request();
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return Err(Failure::Retryable(e.to_string())),
        };

        let status = resp.status();
        let retry_after = parse_retry_after(&resp);
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) if status.is_success() => return Err(Failure::Retryable(e.to_string())),
            Err(_) => String::new(),
        };

        classify(status, retry_after, text, source_id)
    }

    // ── Typed endpoints ──────────────────────────────────────────────

    /// List the plants visible to this account.
    pub async fn plants(&self, token: &AccessToken) -> Result<Vec<Plant>, Error> {
        let endpoint = Endpoint::Plants;
        let resp = self.call(&endpoint, endpoint.method(), None, token).await?;
        if resp.body.is_null() {
            return Ok(Vec::new());
        }
        let parsed: PlantsResponse = decode(resp, endpoint.source_id())?;
        Ok(parsed.plants)
    }

    /// Modules installed in a plant.
    pub async fn topology(
        &self,
        plant_id: &str,
        token: &AccessToken,
    ) -> Result<TopologyPlant, Error> {
        let endpoint = Endpoint::Topology {
            plant_id: plant_id.to_owned(),
        };
        let resp = self.call(&endpoint, endpoint.method(), None, token).await?;
        let parsed: TopologyResponse = decode(resp, endpoint.source_id())?;
        Ok(parsed.plant)
    }

    /// Current status of one chronothermostat.
    pub async fn chronothermostat_status(
        &self,
        plant_id: &str,
        module_id: &str,
        token: &AccessToken,
    ) -> Result<Chronothermostat, Error> {
        let endpoint = Endpoint::ChronothermostatStatus {
            plant_id: plant_id.to_owned(),
            module_id: module_id.to_owned(),
        };
        let resp = self.call(&endpoint, endpoint.method(), None, token).await?;
        let text = resp.text.clone();
        let parsed: StatusResponse = decode(resp, module_id)?;
        parsed
            .into_primary()
            .map_err(|message| Error::MalformedResponse {
                source_id: module_id.to_owned(),
                message,
                body: text,
            })
    }

    /// Write a new status to one chronothermostat.
    pub async fn set_chronothermostat_status(
        &self,
        plant_id: &str,
        module_id: &str,
        update: &StatusUpdate,
        token: &AccessToken,
    ) -> Result<(), Error> {
        let endpoint = Endpoint::SetChronothermostatStatus {
            plant_id: plant_id.to_owned(),
            module_id: module_id.to_owned(),
        };
        let body = serde_json::to_value(update).map_err(|e| Error::MalformedResponse {
            source_id: module_id.to_owned(),
            message: format!("could not encode request: {e}"),
            body: String::new(),
        })?;
        self.call(&endpoint, endpoint.method(), Some(&body), token)
            .await?;
        Ok(())
    }

    /// Programs configured on a chronothermostat.
    pub async fn program_list(
        &self,
        plant_id: &str,
        module_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<Program>, Error> {
        let endpoint = Endpoint::ProgramList {
            plant_id: plant_id.to_owned(),
            module_id: module_id.to_owned(),
        };
        let resp = self.call(&endpoint, endpoint.method(), None, token).await?;
        let parsed: ProgramListResponse = decode(resp, module_id)?;
        Ok(parsed
            .chronothermostats
            .into_iter()
            .next()
            .map(|entry| entry.programs)
            .unwrap_or_default())
    }

    /// All C2C subscriptions on the account.
    pub async fn subscriptions(&self, token: &AccessToken) -> Result<Vec<Subscription>, Error> {
        let endpoint = Endpoint::Subscriptions;
        let resp = self.call(&endpoint, endpoint.method(), None, token).await?;
        if resp.body.is_null() {
            return Ok(Vec::new());
        }
        decode(resp, endpoint.source_id())
    }

    /// Register `endpoint_url` for push delivery of `plant_id` events.
    ///
    /// Returns the new subscription id. An existing registration for the
    /// same plant yields `Error::Conflict`.
    pub async fn subscribe(
        &self,
        plant_id: &str,
        endpoint_url: &str,
        token: &AccessToken,
    ) -> Result<String, Error> {
        let endpoint = Endpoint::Subscribe {
            plant_id: plant_id.to_owned(),
        };
        let body = serde_json::to_value(SubscribeRequest { endpoint_url }).map_err(|e| {
            Error::MalformedResponse {
                source_id: plant_id.to_owned(),
                message: format!("could not encode request: {e}"),
                body: String::new(),
            }
        })?;
        let resp = self
            .call(&endpoint, endpoint.method(), Some(&body), token)
            .await?;
        let parsed: SubscribeResponse = decode(resp, plant_id)?;
        Ok(parsed.subscription_id)
    }

    /// Delete one C2C subscription.
    pub async fn unsubscribe(
        &self,
        plant_id: &str,
        subscription_id: &str,
        token: &AccessToken,
    ) -> Result<(), Error> {
        let endpoint = Endpoint::Unsubscribe {
            plant_id: plant_id.to_owned(),
            subscription_id: subscription_id.to_owned(),
        };
        self.call(&endpoint, endpoint.method(), None, token).await?;
        Ok(())
    }
}

// ── Classification ───────────────────────────────────────────────────

fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    text: String,
    source_id: &str,
) -> Result<ApiResponse, Failure> {
    if status.is_success() {
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                Failure::Fatal(Error::MalformedResponse {
                    source_id: source_id.to_owned(),
                    message: e.to_string(),
                    body: text.clone(),
                })
            })?
        };
        return Ok(ApiResponse {
            status: status.as_u16(),
            body,
            text,
        });
    }

    let err = match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            source_id: source_id.to_owned(),
            retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth {
            status: status.as_u16(),
            message: text,
        },
        StatusCode::CONFLICT => Error::Conflict {
            source_id: source_id.to_owned(),
            body: text,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            return Err(Failure::Retryable(format!("HTTP {status}")));
        }
        s if s.is_server_error() => return Err(Failure::Retryable(format!("HTTP {s}"))),
        s => Error::Api {
            source_id: source_id.to_owned(),
            status: s.as_u16(),
            message: text,
        },
    };
    Err(Failure::Fatal(err))
}

fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn decode<T: DeserializeOwned>(resp: ApiResponse, source_id: &str) -> Result<T, Error> {
    serde_json::from_value(resp.body).map_err(|e| Error::MalformedResponse {
        source_id: source_id.to_owned(),
        message: e.to_string(),
        body: resp.text,
    })
}
