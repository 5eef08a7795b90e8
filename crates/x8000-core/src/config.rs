// ── Runtime configuration for the coordinator ──
//
// These types carry credentials and timing, but never touch disk.
// The CLI constructs them (usually via x8000-config) and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

pub const DEFAULT_NORMAL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_COOLDOWN_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Accepted range for the normal poll interval, in minutes.
pub const NORMAL_INTERVAL_MINUTES: std::ops::RangeInclusive<u64> = 1..=120;
/// Accepted range for the cooldown interval, in minutes.
pub const COOLDOWN_INTERVAL_MINUTES: std::ops::RangeInclusive<u64> = 15..=180;

/// Credentials and endpoints for one Smarther developer account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub api_base_url: Url,
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    /// `Ocp-Apim-Subscription-Key` for the developer portal product.
    pub subscription_key: SecretString,
    /// Long-lived refresh token; rotated on every grant.
    pub refresh_token: SecretString,
    pub timeout: Duration,
}

impl AccountConfig {
    /// Account against the production endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        subscription_key: SecretString,
        refresh_token: SecretString,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            api_base_url: parse_url(x8000_api::client::DEFAULT_BASE_URL)?,
            token_url: parse_url(x8000_api::auth::DEFAULT_TOKEN_URL)?,
            client_id: client_id.into(),
            client_secret,
            subscription_key,
            refresh_token,
            timeout: Duration::from_secs(20),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, CoreError> {
    raw.parse().map_err(|e| CoreError::Config {
        message: format!("invalid URL {raw}: {e}"),
    })
}

/// Timing of the poll scheduler and credential renewal.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Poll interval while healthy.
    pub normal_interval: Duration,
    /// Poll interval (and minimum quiet period) after an account-wide failure.
    pub cooldown_interval: Duration,
    /// How long before expiry the access token is renewed.
    pub refresh_lead: Duration,
    /// Delay before the single retry of a failed scheduled renewal.
    pub refresh_retry_delay: Duration,
    /// Push batches buffered before new ones are dropped.
    pub push_queue_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            normal_interval: DEFAULT_NORMAL_INTERVAL,
            cooldown_interval: DEFAULT_COOLDOWN_INTERVAL,
            refresh_lead: Duration::from_secs(5 * 60),
            refresh_retry_delay: Duration::from_secs(5 * 60),
            push_queue_capacity: 64,
        }
    }
}

impl CoordinatorConfig {
    /// Build from minute values, as stored in the config file.
    pub fn from_minutes(normal: u64, cooldown: u64) -> Result<Self, CoreError> {
        let config = Self {
            normal_interval: minutes("normal", normal)?,
            cooldown_interval: minutes("cooldown", cooldown)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let normal = self.normal_interval.as_secs() / 60;
        if !NORMAL_INTERVAL_MINUTES.contains(&normal) {
            return Err(CoreError::ValidationFailed {
                message: format!(
                    "normal interval must be {}..={} minutes, got {normal}",
                    NORMAL_INTERVAL_MINUTES.start(),
                    NORMAL_INTERVAL_MINUTES.end()
                ),
            });
        }
        let cooldown = self.cooldown_minutes();
        if !COOLDOWN_INTERVAL_MINUTES.contains(&cooldown) {
            return Err(CoreError::ValidationFailed {
                message: format!(
                    "cooldown interval must be {}..={} minutes, got {cooldown}",
                    COOLDOWN_INTERVAL_MINUTES.start(),
                    COOLDOWN_INTERVAL_MINUTES.end()
                ),
            });
        }
        if self.push_queue_capacity == 0 {
            return Err(CoreError::ValidationFailed {
                message: "push queue capacity must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn cooldown_minutes(&self) -> u64 {
        self.cooldown_interval.as_secs() / 60
    }
}

fn minutes(name: &str, value: u64) -> Result<Duration, CoreError> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| CoreError::ValidationFailed {
            message: format!("{name} interval of {value} minutes is out of range"),
        })
}
