// Token renewal timing, refresh coalescing and rotation.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::time::Instant;

use common::{HOUR, MINUTE, MockTokens, credentials};
use x8000_core::CoreError;

fn assert_near(actual: Instant, expected: Instant) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(diff < Duration::from_secs(1), "off by {diff:?}");
}

#[tokio::test(start_paused = true)]
async fn cached_token_is_reused_until_expiry() {
    let tokens = Arc::new(MockTokens::new(HOUR));
    let manager = credentials(tokens.clone());

    let first = manager.valid_token().await.unwrap();
    tokio::time::advance(30 * MINUTE).await;
    let second = manager.valid_token().await.unwrap();

    assert_eq!(first.expose_secret(), second.expose_secret());
    assert_eq!(tokens.calls().len(), 1);

    tokio::time::advance(30 * MINUTE).await;
    let third = manager.valid_token().await.unwrap();
    assert_eq!(third.expose_secret(), "access-2");
    assert_eq!(manager.current().unwrap().generation, 2);
}

#[tokio::test(start_paused = true)]
async fn renewal_fires_five_minutes_before_expiry() {
    let tokens = Arc::new(MockTokens::new(HOUR));
    let manager = credentials(tokens.clone());
    let cancel = tokio_util::sync::CancellationToken::new();

    let t0 = Instant::now();
    manager.valid_token().await.unwrap();
    let renewal = manager.spawn_renewal(cancel.clone());

    tokio::time::sleep(HOUR).await;

    let calls = tokens.calls();
    assert_eq!(calls.len(), 2);
    assert_near(calls[0], t0);
    assert_near(calls[1], t0 + HOUR - 5 * MINUTE);

    cancel.cancel();
    renewal.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_refresh() {
    let tokens = Arc::new(MockTokens::new(HOUR).with_latency(Duration::from_secs(2)));
    let manager = credentials(tokens.clone());

    let (a, b, c, d, e) = tokio::join!(
        manager.valid_token(),
        manager.valid_token(),
        manager.valid_token(),
        manager.valid_token(),
        manager.valid_token(),
    );

    for token in [a, b, c, d, e] {
        assert_eq!(token.unwrap().expose_secret(), "access-1");
    }
    assert_eq!(tokens.calls().len(), 1);
    assert_eq!(manager.refresh_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_failures_share_one_error() {
    let tokens = Arc::new(MockTokens::new(HOUR).with_latency(Duration::from_secs(2)));
    tokens.set_failing(true);
    let manager = credentials(tokens.clone());

    let (a, b) = tokio::join!(manager.valid_token(), manager.valid_token());

    assert!(matches!(a, Err(CoreError::AuthenticationFailed { .. })));
    assert!(matches!(b, Err(CoreError::AuthenticationFailed { .. })));
    assert_eq!(tokens.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rotated_refresh_token_is_presented_next() {
    let tokens = Arc::new(MockTokens::new(HOUR));
    let manager = credentials(tokens.clone());
    let mut changes = manager.subscribe();

    manager.valid_token().await.unwrap();
    let issued = changes.borrow_and_update().clone().unwrap();
    assert_eq!(issued.refresh_token.expose_secret(), "refresh-1");

    let renewed = manager.force_refresh().await.unwrap();
    assert_eq!(renewed.generation, 2);
    assert_eq!(
        tokens.presented(),
        vec!["seed-refresh".to_string(), "refresh-1".to_string()]
    );
    assert!(changes.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn failed_renewal_and_retry_surface_auth_failure() {
    let tokens = Arc::new(MockTokens::new(HOUR));
    let manager = credentials(tokens.clone());
    let cancel = tokio_util::sync::CancellationToken::new();

    let t0 = Instant::now();
    manager.valid_token().await.unwrap();
    let _renewal = manager.spawn_renewal(cancel.clone());
    tokens.set_failing(true);

    tokio::time::sleep(HOUR + Duration::from_secs(1)).await;

    let calls = tokens.calls();
    assert_eq!(calls.len(), 3);
    assert_near(calls[1], t0 + HOUR - 5 * MINUTE);
    assert_near(calls[2], t0 + HOUR);

    // The old token has expired, so callers see the failure.
    let err = manager.valid_token().await.unwrap_err();
    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(tokens.calls().len(), 4);

    tokens.set_failing(false);
    let token = manager.valid_token().await.unwrap();
    assert_eq!(token.expose_secret(), "access-5");
    cancel.cancel();
}
