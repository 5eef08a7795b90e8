use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `x8000-api` crate.
///
/// Every HTTP outcome the coordinator cares about is classified here.
/// `RateLimited` and `Auth` are account-wide; everything else is scoped
/// to the single call that produced it. `x8000-core` maps these into
/// user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Account-wide ────────────────────────────────────────────────
    /// HTTP 429. Never retried.
    #[error("Rate limited while calling {source_id}{}", fmt_retry_after(.retry_after.as_ref()))]
    RateLimited {
        /// Plant or module id the failing request was addressed to.
        source_id: String,
        retry_after: Option<Duration>,
    },

    /// HTTP 401/403, or a rejected token exchange. Never retried.
    #[error("Authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    // ── Per-call ────────────────────────────────────────────────────
    /// Timeouts, connection failures and 5xx after the retry budget ran out.
    #[error("Network failure calling {source_id} after {attempts} attempt(s): {message}")]
    TransientNetwork {
        source_id: String,
        attempts: u32,
        message: String,
    },

    /// Body missing a field the caller requires, or not JSON at all.
    #[error("Malformed response from {source_id}: {message}")]
    MalformedResponse {
        source_id: String,
        message: String,
        body: String,
    },

    /// HTTP 409. Subscription management relies on seeing this distinctly.
    #[error("Conflict on {source_id}")]
    Conflict { source_id: String, body: String },

    /// Any other non-success status.
    #[error("API error (HTTP {status}) from {source_id}: {message}")]
    Api {
        source_id: String,
        status: u16,
        message: String,
    },

    // ── Setup ───────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed.
    #[error("TLS error: {0}")]
    Tls(String),
}

fn fmt_retry_after(retry_after: Option<&Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl Error {
    /// Returns `true` for HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns `true` if the credential was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns `true` for errors that must stop all further calls on the account.
    pub fn is_account_wide(&self) -> bool {
        self.is_rate_limited() || self.is_auth()
    }

    /// Returns `true` if the retry budget was spent on this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Returns `true` for HTTP 409.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// The plant/module id the failing request targeted, if known.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::RateLimited { source_id, .. }
            | Self::TransientNetwork { source_id, .. }
            | Self::MalformedResponse { source_id, .. }
            | Self::Conflict { source_id, .. }
            | Self::Api { source_id, .. } => Some(source_id),
            Self::Auth { .. } | Self::InvalidUrl(_) | Self::Tls(_) => None,
        }
    }
}
