// ── Core error types ──
//
// User-facing errors from x8000-core. Consumers never see HTTP status
// codes or raw bodies; the `From<x8000_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Account-wide ─────────────────────────────────────────────────
    #[error("Rate limited by the cloud service while calling {source_id}")]
    RateLimited {
        source_id: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cooling down after an account-wide failure; {remaining_secs}s remaining")]
    CoolingDown { remaining_secs: u64 },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cloud service unreachable ({source_id}): {reason}")]
    ConnectionFailed { source_id: String, reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Malformed data from {source_id}: {message}")]
    MalformedData { source_id: String, message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures that stop all calls on the account.
    pub fn is_account_wide(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::AuthenticationFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<x8000_api::Error> for CoreError {
    fn from(err: x8000_api::Error) -> Self {
        match err {
            x8000_api::Error::RateLimited {
                source_id,
                retry_after,
            } => CoreError::RateLimited {
                source_id,
                retry_after_secs: retry_after.map(|d| d.as_secs()),
            },
            x8000_api::Error::Auth { status, message } => CoreError::AuthenticationFailed {
                message: if message.is_empty() {
                    format!("credential rejected (HTTP {status})")
                } else {
                    message
                },
            },
            x8000_api::Error::TransientNetwork {
                source_id,
                attempts,
                message,
            } => CoreError::ConnectionFailed {
                source_id,
                reason: format!("{message} (after {attempts} attempts)"),
            },
            x8000_api::Error::MalformedResponse {
                source_id, message, ..
            } => CoreError::MalformedData { source_id, message },
            x8000_api::Error::Conflict { source_id, .. } => CoreError::Conflict {
                message: format!("conflicting resource on {source_id}"),
            },
            x8000_api::Error::Api {
                source_id,
                status,
                message,
            } => CoreError::Api {
                message: format!("{source_id}: {message}"),
                status: Some(status),
            },
            x8000_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            x8000_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
        }
    }
}
