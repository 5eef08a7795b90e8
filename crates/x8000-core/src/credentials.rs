// ── Credential lifecycle ──
//
// Holds the current access token, renews it ahead of expiry on a
// background task, and coalesces concurrent refresh requests so the
// token endpoint sees at most one grant in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use x8000_api::AccessToken;

use crate::api::TokenSource;
use crate::config::CoordinatorConfig;
use crate::error::CoreError;

/// Minimum age of a token before the renewal task may replace it.
const MIN_TOKEN_AGE: Duration = Duration::from_secs(60);

/// Upper bound on a server-declared lifetime.
const MAX_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// One issued access token.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: AccessToken,
    /// Refresh token to use for the next grant.
    pub refresh_token: SecretString,
    pub issued_at: Instant,
    pub expires_at: Instant,
    /// Wall-clock expiry, for display.
    pub expires_at_utc: DateTime<Utc>,
    /// Increments on every successful grant.
    pub generation: u64,
}

impl Token {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Instant at which the renewal task replaces this token.
    pub fn renew_at(&self, lead: Duration) -> Instant {
        let ahead = self
            .expires_at
            .checked_sub(lead)
            .unwrap_or(self.issued_at);
        ahead.max(self.issued_at + MIN_TOKEN_AGE)
    }
}

/// Shared handle to the account's credentials. Cheap to clone.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<CredentialInner>,
}

struct CredentialInner {
    source: Arc<dyn TokenSource>,
    seed: SecretString,
    current: ArcSwapOption<Token>,
    refresh: Mutex<RefreshRecord>,
    /// Completed refresh attempts, successful or not.
    attempts: AtomicU64,
    changes: watch::Sender<Option<Arc<Token>>>,
    refresh_lead: Duration,
    retry_delay: Duration,
}

#[derive(Default)]
struct RefreshRecord {
    last_error: Option<String>,
}

impl CredentialManager {
    /// No token is requested until the first `valid_token()` call.
    pub fn new(
        source: Arc<dyn TokenSource>,
        refresh_token: SecretString,
        config: &CoordinatorConfig,
    ) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            inner: Arc::new(CredentialInner {
                source,
                seed: refresh_token,
                current: ArcSwapOption::empty(),
                refresh: Mutex::new(RefreshRecord::default()),
                attempts: AtomicU64::new(0),
                changes,
                refresh_lead: config.refresh_lead,
                retry_delay: config.refresh_retry_delay,
            }),
        }
    }

    /// The cached token, if any, without checking expiry.
    pub fn current(&self) -> Option<Arc<Token>> {
        self.inner.current.load_full()
    }

    /// Watch every newly issued token. Used to persist rotated refresh tokens.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Token>>> {
        self.inner.changes.subscribe()
    }

    /// Number of refresh attempts made so far.
    pub fn refresh_attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// A non-expired access token, refreshing first if needed.
    pub async fn valid_token(&self) -> Result<AccessToken, CoreError> {
        if let Some(token) = self.usable(Instant::now()) {
            return Ok(token.access_token.clone());
        }
        let token = self.refresh_coalesced(false).await?;
        Ok(token.access_token.clone())
    }

    /// Refresh now regardless of the cached token's expiry.
    pub async fn force_refresh(&self) -> Result<Arc<Token>, CoreError> {
        self.refresh_coalesced(true).await
    }

    /// Spawn the proactive renewal task.
    pub fn spawn_renewal(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.renewal_loop(cancel).await })
    }

    // ── Refresh ──────────────────────────────────────────────────────

    fn usable(&self, now: Instant) -> Option<Arc<Token>> {
        self.inner
            .current
            .load_full()
            .filter(|token| !token.is_expired(now))
    }

    /// Run one refresh, or share the outcome of one that completed
    /// while this caller waited for the lock.
    async fn refresh_coalesced(&self, force: bool) -> Result<Arc<Token>, CoreError> {
        let seen = self.inner.attempts.load(Ordering::Acquire);
        let mut record = self.inner.refresh.lock().await;

        if self.inner.attempts.load(Ordering::Acquire) != seen {
            debug!("joining a refresh that completed while waiting");
            return match &record.last_error {
                None => self.current().ok_or_else(|| CoreError::AuthenticationFailed {
                    message: "no token after refresh".into(),
                }),
                Some(message) => Err(CoreError::AuthenticationFailed {
                    message: message.clone(),
                }),
            };
        }
        if !force {
            if let Some(token) = self.usable(Instant::now()) {
                return Ok(token);
            }
        }

        let result = self.perform_refresh().await;
        record.last_error = result.as_ref().err().map(|e| match e {
            CoreError::AuthenticationFailed { message } => message.clone(),
            other => other.to_string(),
        });
        self.inner.attempts.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn perform_refresh(&self) -> Result<Arc<Token>, CoreError> {
        let previous = self.current();
        let refresh_token = previous
            .as_ref()
            .map_or_else(|| self.inner.seed.clone(), |t| t.refresh_token.clone());

        let grant = self
            .inner
            .source
            .refresh(&refresh_token)
            .await
            .map_err(|e| {
                warn!(error = %e, "token refresh failed");
                CoreError::AuthenticationFailed {
                    message: e.to_string(),
                }
            })?;

        let issued_at = Instant::now();
        let lifetime = grant.expires_in.min(MAX_LIFETIME);
        let wall_lifetime = TimeDelta::from_std(lifetime).unwrap_or_else(|_| TimeDelta::zero());
        let token = Arc::new(Token {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or(refresh_token),
            issued_at,
            expires_at: issued_at + lifetime,
            expires_at_utc: Utc::now() + wall_lifetime,
            generation: previous.map_or(1, |t| t.generation + 1),
        });

        info!(
            generation = token.generation,
            expires_in_secs = lifetime.as_secs(),
            "access token refreshed"
        );
        self.inner.current.store(Some(Arc::clone(&token)));
        self.inner.changes.send_replace(Some(Arc::clone(&token)));
        Ok(token)
    }

    // ── Renewal task ─────────────────────────────────────────────────

    async fn renewal_loop(&self, cancel: CancellationToken) {
        let mut changes = self.inner.changes.subscribe();

        loop {
            let current = changes.borrow_and_update().clone();
            let Some(token) = current else {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    r = changes.changed() => if r.is_err() { return },
                }
                continue;
            };

            let deadline = token.renew_at(self.inner.refresh_lead);
            debug!(generation = token.generation, "renewal scheduled");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                r = changes.changed() => {
                    if r.is_err() { return }
                    continue;
                }
                () = tokio::time::sleep_until(deadline) => {}
            }

            if self.force_refresh().await.is_ok() {
                continue;
            }
            warn!(
                retry_in_secs = self.inner.retry_delay.as_secs(),
                "scheduled token renewal failed, retrying once"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                r = changes.changed() => {
                    if r.is_err() { return }
                    continue;
                }
                () = tokio::time::sleep(self.inner.retry_delay) => {}
            }

            if let Err(e) = self.force_refresh().await {
                error!(error = %e, "token renewal retry failed; waiting for a new credential");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    r = changes.changed() => if r.is_err() { return },
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn token(issued: Instant, lifetime: Duration) -> Token {
        Token {
            access_token: AccessToken::new("a"),
            refresh_token: SecretString::from("r".to_string()),
            issued_at: issued,
            expires_at: issued + lifetime,
            expires_at_utc: Utc::now(),
            generation: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn renew_at_leads_expiry() {
        let now = Instant::now();
        let t = token(now, Duration::from_secs(3600));
        assert_eq!(t.renew_at(Duration::from_secs(300)), now + Duration::from_secs(3300));
    }

    #[tokio::test(start_paused = true)]
    async fn short_lived_token_waits_minimum_age() {
        let now = Instant::now();
        let t = token(now, Duration::from_secs(120));
        assert_eq!(t.renew_at(Duration::from_secs(300)), now + MIN_TOKEN_AGE);
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + Duration::from_secs(120)));
    }
}
