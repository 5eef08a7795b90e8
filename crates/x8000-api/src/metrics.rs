// ── Request accounting ──
//
// Counts every physical HTTP request, retries included, so call volume
// against the account quota can be audited.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct ApiMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    rate_limited: AtomicU64,
    auth_failures: AtomicU64,
    other_failures: AtomicU64,
    /// Unix millis of the last request; 0 means never.
    last_request_ms: AtomicI64,
}

/// Point-in-time copy of [`ApiMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub rate_limited: u64,
    pub auth_failures: u64,
    pub other_failures: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Success,
    RateLimited,
    AuthFailure,
    OtherFailure,
}

impl ApiMetrics {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.last_request_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub(crate) fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.successes,
            Outcome::RateLimited => &self.rate_limited,
            Outcome::AuthFailure => &self.auth_failures,
            Outcome::OtherFailure => &self.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_ms = self.last_request_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            other_failures: self.other_failures.load(Ordering::Relaxed),
            last_request_at: (last_ms != 0)
                .then(|| DateTime::from_timestamp_millis(last_ms))
                .flatten(),
        }
    }
}
