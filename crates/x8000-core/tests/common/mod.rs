// Scripted collaborators shared by the coordinator and credential tests.
#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use tokio::time::Instant;

use x8000_api::models::{
    Chronothermostat, Plant, Program, StatusUpdate, Subscription, TopologyModule, TopologyPlant,
};
use x8000_api::{AccessToken, Error, TokenGrant};
use x8000_core::{
    CoordinatorConfig, CredentialManager, DeviceId, Fleet, FleetEntry, PlantId, ThermostatApi,
    TokenSource,
};

// ── Thermostat API ──────────────────────────────────────────────────

/// Scripted reply for one status read.
#[derive(Debug, Clone)]
pub enum Reply {
    Temperature(f64),
    UnknownMode,
    RateLimited,
    Auth,
    Malformed,
    Transient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub at: Instant,
    pub op: &'static str,
    pub device: Option<String>,
}

/// Status reads default to 20 °C once a device's script runs out.
#[derive(Default)]
pub struct MockApi {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
    writes: Mutex<Vec<(String, StatusUpdate)>>,
    subscriptions: Mutex<Vec<Subscription>>,
    write_error: Mutex<Option<Reply>>,
    conflict_next_subscribe: AtomicBool,
    next_id: AtomicUsize,
}

impl MockApi {
    pub fn script(&self, device: &str, replies: impl IntoIterator<Item = Reply>) {
        self.replies
            .lock()
            .unwrap()
            .entry(device.to_owned())
            .or_default()
            .extend(replies);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == "status")
            .collect()
    }

    pub fn writes(&self) -> Vec<(String, StatusUpdate)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_writes_with(&self, reply: Reply) {
        *self.write_error.lock().unwrap() = Some(reply);
    }

    pub fn add_subscription(&self, id: &str, plant: &str, url: &str) {
        self.subscriptions.lock().unwrap().push(Subscription {
            subscription_id: id.into(),
            plant_id: plant.into(),
            endpoint_url: url.into(),
        });
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn conflict_on_next_subscribe(&self) {
        self.conflict_next_subscribe.store(true, Ordering::SeqCst);
    }

    fn record(&self, op: &'static str, device: Option<&DeviceId>) {
        self.calls.lock().unwrap().push(Call {
            at: Instant::now(),
            op,
            device: device.map(ToString::to_string),
        });
    }

    fn next_reply(&self, device: &DeviceId) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .get_mut(device.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Temperature(20.0))
    }
}

fn failure(reply: &Reply, source: &str) -> Option<Error> {
    match reply {
        Reply::RateLimited => Some(Error::RateLimited {
            source_id: source.into(),
            retry_after: Some(Duration::from_secs(60)),
        }),
        Reply::Auth => Some(Error::Auth {
            status: 401,
            message: "token expired".into(),
        }),
        Reply::Malformed => Some(Error::MalformedResponse {
            source_id: source.into(),
            message: "missing field `mode`".into(),
            body: "{}".into(),
        }),
        Reply::Transient => Some(Error::TransientNetwork {
            source_id: source.into(),
            attempts: 4,
            message: "HTTP 503".into(),
        }),
        Reply::Temperature(_) | Reply::UnknownMode => None,
    }
}

pub fn status(temperature: f64, mode: &str) -> Chronothermostat {
    serde_json::from_value(json!({
        "function": "heating",
        "mode": mode,
        "setPoint": { "value": "20.0", "unit": "C" },
        "programs": [{ "number": 1 }],
        "loadState": "active",
        "thermometer": { "measures": [{ "value": temperature, "unit": "C" }] },
        "hygrometer": { "measures": [{ "value": "45" }] }
    }))
    .unwrap()
}

#[async_trait]
impl ThermostatApi for MockApi {
    async fn plants(&self, _token: &AccessToken) -> Result<Vec<Plant>, Error> {
        self.record("plants", None);
        Ok(vec![Plant {
            id: "p1".into(),
            name: "Home".into(),
        }])
    }

    async fn topology(&self, plant: &PlantId, _token: &AccessToken) -> Result<TopologyPlant, Error> {
        self.record("topology", None);
        Ok(TopologyPlant {
            id: plant.to_string(),
            name: "Home".into(),
            modules: vec![
                TopologyModule {
                    id: "sala".into(),
                    name: "Sala".into(),
                    device: "chronothermostat".into(),
                },
                TopologyModule {
                    id: "gw".into(),
                    name: "Gateway".into(),
                    device: "gateway".into(),
                },
            ],
        })
    }

    async fn program_list(
        &self,
        _plant: &PlantId,
        device: &DeviceId,
        _token: &AccessToken,
    ) -> Result<Vec<Program>, Error> {
        self.record("programs", Some(device));
        Ok(vec![Program {
            number: 1,
            name: "Comfort".into(),
        }])
    }

    async fn chronothermostat_status(
        &self,
        _plant: &PlantId,
        device: &DeviceId,
        _token: &AccessToken,
    ) -> Result<Chronothermostat, Error> {
        self.record("status", Some(device));
        let reply = self.next_reply(device);
        if let Some(err) = failure(&reply, device.as_str()) {
            return Err(err);
        }
        Ok(match reply {
            Reply::UnknownMode => status(20.0, "turbo"),
            Reply::Temperature(t) => status(t, "automatic"),
            _ => unreachable!(),
        })
    }

    async fn set_chronothermostat_status(
        &self,
        _plant: &PlantId,
        device: &DeviceId,
        update: &StatusUpdate,
        _token: &AccessToken,
    ) -> Result<(), Error> {
        self.record("write", Some(device));
        if let Some(reply) = self.write_error.lock().unwrap().take() {
            if let Some(err) = failure(&reply, device.as_str()) {
                return Err(err);
            }
        }
        self.writes
            .lock()
            .unwrap()
            .push((device.to_string(), update.clone()));
        Ok(())
    }

    async fn list_subscriptions(&self, _token: &AccessToken) -> Result<Vec<Subscription>, Error> {
        self.record("list_subscriptions", None);
        Ok(self.subscriptions())
    }

    async fn subscribe(
        &self,
        plant: &PlantId,
        endpoint_url: &str,
        _token: &AccessToken,
    ) -> Result<String, Error> {
        self.record("subscribe", None);
        if self.conflict_next_subscribe.swap(false, Ordering::SeqCst) {
            return Err(Error::Conflict {
                source_id: plant.to_string(),
                body: "already subscribed".into(),
            });
        }
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.add_subscription(&id, plant.as_str(), endpoint_url);
        Ok(id)
    }

    async fn unsubscribe(
        &self,
        _plant: &PlantId,
        subscription_id: &str,
        _token: &AccessToken,
    ) -> Result<(), Error> {
        self.record("unsubscribe", None);
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|s| s.subscription_id != subscription_id);
        Ok(())
    }
}

// ── Token source ────────────────────────────────────────────────────

/// Issues tokens with a fixed lifetime and records when it was asked.
pub struct MockTokens {
    calls: Mutex<Vec<Instant>>,
    refresh_tokens: Mutex<Vec<String>>,
    failing: AtomicBool,
    lifetime: Duration,
    latency: Duration,
}

impl MockTokens {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            refresh_tokens: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            lifetime,
            latency: Duration::ZERO,
        }
    }

    /// Each grant takes `latency` to complete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    /// Refresh tokens presented, in order.
    pub fn presented(&self) -> Vec<String> {
        self.refresh_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenSource for MockTokens {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, Error> {
        use secrecy::ExposeSecret;

        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            calls.len()
        };
        self.refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.expose_secret().to_owned());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Auth {
                status: 400,
                message: "invalid_grant".into(),
            });
        }
        Ok(TokenGrant {
            access_token: AccessToken::new(format!("access-{n}")),
            refresh_token: Some(SecretString::from(format!("refresh-{n}"))),
            expires_in: self.lifetime,
        })
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub const HOUR: Duration = Duration::from_secs(3600);
pub const MINUTE: Duration = Duration::from_secs(60);

pub fn fleet(ids: &[&str]) -> Fleet {
    Fleet::new(ids.iter().map(|id| FleetEntry::new(*id, "p1", id.to_uppercase()))).unwrap()
}

pub fn credentials(tokens: std::sync::Arc<MockTokens>) -> CredentialManager {
    CredentialManager::new(
        tokens,
        SecretString::from("seed-refresh".to_string()),
        &CoordinatorConfig::default(),
    )
}

/// Push body in the shape the cloud delivers.
pub fn push_body(module: &str, temperature: f64) -> Vec<u8> {
    serde_json::to_vec(&json!([{
        "id": "evt-1",
        "eventType": "Microsoft.EventGrid",
        "data": {
            "chronothermostats": [{
                "function": "heating",
                "mode": "automatic",
                "thermometer": { "measures": [{ "value": temperature.to_string(), "unit": "C" }] },
                "sender": {
                    "addressLocation": { "plant": "p1" },
                    "plant": { "id": "p1", "module": { "id": module } }
                }
            }]
        }
    }]))
    .unwrap()
}
