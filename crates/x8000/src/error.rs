//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use x8000_config::ConfigError;
use x8000_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const RATE_LIMITED: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Smarther cloud ({source_id})")]
    #[diagnostic(
        code(x8000::connection_failed),
        help("Retries were exhausted. Check network access to api.developer.legrand.com.\n{reason}")
    )]
    ConnectionFailed { source_id: String, reason: String },

    // ── Account-wide ─────────────────────────────────────────────────
    #[error("Rate limited by the Smarther cloud while calling {source_id}")]
    #[diagnostic(
        code(x8000::rate_limited),
        help(
            "The developer account's call quota is exhausted.\n\
             Wait before retrying; `x8000 run` backs off automatically."
        )
    )]
    RateLimited { source_id: String },

    #[error("Cooling down after an account-wide failure ({remaining_secs}s left)")]
    #[diagnostic(
        code(x8000::cooling_down),
        help("Calls are suspended until the cooldown ends.")
    )]
    CoolingDown { remaining_secs: u64 },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(x8000::auth_failed),
        help(
            "The refresh token may have been revoked or already used.\n\
             Obtain a new one with: x8000 token exchange <code> --redirect-uri <uri>"
        )
    )]
    AuthFailed { message: String },

    #[error("No {secret} configured for profile '{profile}'")]
    #[diagnostic(
        code(x8000::no_credentials),
        help(
            "Store it in the system keyring, set the matching X8000_* environment\n\
             variable, or add it to the profile in the config file."
        )
    )]
    NoCredentials { profile: String, secret: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(x8000::not_found),
        help("Run: x8000 {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Conflict: {message}")]
    #[diagnostic(code(x8000::conflict))]
    Conflict { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(x8000::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(x8000::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(x8000::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("No thermostats configured for profile '{profile}'")]
    #[diagnostic(
        code(x8000::empty_fleet),
        help("Run: x8000 discover --save")
    )]
    EmptyFleet { profile: String },

    #[error(transparent)]
    #[diagnostic(code(x8000::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    #[diagnostic(code(x8000::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    #[diagnostic(code(x8000::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::RateLimited { .. } | Self::CoolingDown { .. } => exit_code::RATE_LIMITED,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::EmptyFleet { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile, secret } => CliError::NoCredentials {
                profile,
                secret: secret.into(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { source_id, reason } => {
                CliError::ConnectionFailed { source_id, reason }
            }

            CoreError::RateLimited { source_id, .. } => CliError::RateLimited { source_id },

            CoreError::CoolingDown { remaining_secs } => CliError::CoolingDown { remaining_secs },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "thermostat".into(),
                identifier,
                list_command: "discover".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Conflict { message } => CliError::Conflict { message },

            CoreError::MalformedData { source_id, message } => CliError::ApiError {
                code: "malformed".into(),
                message: format!("{source_id}: {message}"),
            },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "unknown".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<x8000_api::Error> for CliError {
    fn from(err: x8000_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
