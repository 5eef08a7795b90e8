//! Shared configuration for the x8000 binary.
//!
//! TOML profiles, secret resolution (env + keyring + plaintext), and
//! translation into the runtime types `x8000_core` consumes. The core
//! never reads files; everything it needs is built here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use x8000_core::{AccountConfig, CoordinatorConfig, Fleet, FleetEntry, ProgramInfo};

/// Service name under which secrets live in the system keyring.
pub const KEYRING_SERVICE: &str = "x8000";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {secret} configured for profile '{profile}'")]
    NoCredentials { profile: String, secret: &'static str },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`, else "default".
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval while healthy, in minutes.
    #[serde(default = "default_normal_interval")]
    pub normal_interval: u64,

    /// Poll interval after rate limiting or an auth failure, in minutes.
    #[serde(default = "default_cooldown_interval")]
    pub cooldown_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            normal_interval: default_normal_interval(),
            cooldown_interval: default_cooldown_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    20
}
fn default_normal_interval() -> u64 {
    5
}
fn default_cooldown_interval() -> u64 {
    60
}

/// A named developer-account profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// OAuth client id from the developer portal.
    pub client_id: String,

    /// OAuth client secret (plaintext, prefer keyring or env var).
    pub client_secret: Option<String>,

    /// Environment variable holding the client secret.
    pub client_secret_env: Option<String>,

    /// `Ocp-Apim-Subscription-Key` (plaintext, prefer keyring or env var).
    pub subscription_key: Option<String>,

    pub subscription_key_env: Option<String>,

    /// Refresh token (plaintext, prefer keyring). Rotated tokens are
    /// always written to the keyring.
    pub refresh_token: Option<String>,

    pub refresh_token_env: Option<String>,

    /// Override the API base URL.
    pub api_url: Option<String>,

    /// Override the OAuth token endpoint.
    pub token_url: Option<String>,

    pub timeout: Option<u64>,
    pub normal_interval: Option<u64>,
    pub cooldown_interval: Option<u64>,

    /// Thermostats to poll, in poll order.
    #[serde(default)]
    pub thermostats: Vec<Thermostat>,

    #[serde(default)]
    pub webhook: Webhook,
}

/// One chronothermostat in the fleet.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Thermostat {
    pub plant_id: String,
    pub module_id: String,
    /// Display name; defaults to the module id.
    pub name: Option<String>,
    #[serde(default)]
    pub programs: Vec<ProgramInfo>,
}

impl From<&FleetEntry> for Thermostat {
    fn from(entry: &FleetEntry) -> Self {
        Self {
            plant_id: entry.plant_id.to_string(),
            module_id: entry.id.to_string(),
            name: Some(entry.name.clone()),
            programs: entry.programs.clone(),
        }
    }
}

/// Push delivery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Webhook {
    /// Publicly reachable base URL of this installation.
    pub external_url: Option<String>,

    /// Local address the listener binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Path segment that identifies this installation's webhook.
    pub webhook_id: Option<String>,
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            external_url: None,
            listen: default_listen(),
            webhook_id: None,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Webhook {
    /// Full endpoint URL to register with the cloud, when push is configured.
    pub fn endpoint_url(&self) -> Option<String> {
        let base = self.external_url.as_deref()?;
        let id = self.webhook_id.as_deref()?;
        Some(format!(
            "{}{}{id}",
            base.trim_end_matches('/'),
            x8000_core::subscription::WEBHOOK_PATH
        ))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "x8000").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("x8000");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered under `X8000_`-prefixed environment
/// variables (`X8000_DEFAULTS__TIMEOUT=30`). A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("X8000_")
                .split("__")
                .ignore(&["config", "profile", "client_secret", "subscription_key", "refresh_token"]),
        );

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

/// The account secrets a profile needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    ClientSecret,
    SubscriptionKey,
    RefreshToken,
}

impl SecretKind {
    fn label(self) -> &'static str {
        match self {
            Self::ClientSecret => "client secret",
            Self::SubscriptionKey => "subscription key",
            Self::RefreshToken => "refresh token",
        }
    }

    fn keyring_key(self) -> &'static str {
        match self {
            Self::ClientSecret => "client-secret",
            Self::SubscriptionKey => "subscription-key",
            Self::RefreshToken => "refresh-token",
        }
    }

    /// Variable consulted when the profile names none.
    pub fn default_env(self) -> &'static str {
        match self {
            Self::ClientSecret => "X8000_CLIENT_SECRET",
            Self::SubscriptionKey => "X8000_SUBSCRIPTION_KEY",
            Self::RefreshToken => "X8000_REFRESH_TOKEN",
        }
    }

    fn env_override(self, profile: &Profile) -> Option<&str> {
        match self {
            Self::ClientSecret => profile.client_secret_env.as_deref(),
            Self::SubscriptionKey => profile.subscription_key_env.as_deref(),
            Self::RefreshToken => profile.refresh_token_env.as_deref(),
        }
    }

    fn plaintext(self, profile: &Profile) -> Option<&str> {
        match self {
            Self::ClientSecret => profile.client_secret.as_deref(),
            Self::SubscriptionKey => profile.subscription_key.as_deref(),
            Self::RefreshToken => profile.refresh_token.as_deref(),
        }
    }
}

fn keyring_entry(profile_name: &str, kind: SecretKind) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{}", kind.keyring_key()))
}

/// Resolve a secret: environment variable, then system keyring, then
/// plaintext in the profile.
pub fn resolve_secret(
    profile: &Profile,
    profile_name: &str,
    kind: SecretKind,
) -> Result<SecretString, ConfigError> {
    // 1. Env var (profile override, else the well-known name)
    let env_name = kind.env_override(profile).unwrap_or(kind.default_env());
    if let Ok(val) = std::env::var(env_name) {
        if !val.is_empty() {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name, kind) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(value) = kind.plaintext(profile) {
        return Ok(SecretString::from(value.to_owned()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        secret: kind.label(),
    })
}

/// Write a secret to the system keyring.
pub fn store_secret(profile_name: &str, kind: SecretKind, value: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, kind)?.set_password(value)?;
    Ok(())
}

/// Persist a rotated refresh token.
pub fn store_refresh_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    use secrecy::ExposeSecret;
    store_secret(profile_name, SecretKind::RefreshToken, token.expose_secret())
}

// ── Translation to runtime types ────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build the account credentials and endpoints for a profile.
pub fn profile_to_account(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<AccountConfig, ConfigError> {
    if profile.client_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "client_id".into(),
            reason: "must not be empty".into(),
        });
    }

    let mut account = AccountConfig::new(
        profile.client_id.clone(),
        resolve_secret(profile, profile_name, SecretKind::ClientSecret)?,
        resolve_secret(profile, profile_name, SecretKind::SubscriptionKey)?,
        resolve_secret(profile, profile_name, SecretKind::RefreshToken)?,
    )
    .map_err(|e| ConfigError::Validation {
        field: "account".into(),
        reason: e.to_string(),
    })?;

    if let Some(ref raw) = profile.api_url {
        account.api_base_url = parse_url("api_url", raw)?;
    }
    if let Some(ref raw) = profile.token_url {
        account.token_url = parse_url("token_url", raw)?;
    }
    account.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(account)
}

/// Poll timing for a profile, falling back to the global defaults.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    let normal = profile.normal_interval.unwrap_or(defaults.normal_interval);
    let cooldown = profile.cooldown_interval.unwrap_or(defaults.cooldown_interval);
    CoordinatorConfig::from_minutes(normal, cooldown).map_err(|e| ConfigError::Validation {
        field: "interval".into(),
        reason: e.to_string(),
    })
}

/// The ordered fleet a profile polls.
pub fn profile_fleet(profile: &Profile) -> Result<Fleet, ConfigError> {
    let entries = profile.thermostats.iter().map(|t| {
        FleetEntry::new(
            t.module_id.as_str(),
            t.plant_id.as_str(),
            t.name.clone().unwrap_or_else(|| t.module_id.clone()),
        )
        .with_programs(t.programs.clone())
    });
    Fleet::new(entries).map_err(|e| ConfigError::Validation {
        field: "thermostats".into(),
        reason: e.to_string(),
    })
}
