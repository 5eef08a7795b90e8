// Integration tests for the poll loop, fail-fast policy, push path and
// command routing, driven by scripted collaborators under paused time.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use common::{HOUR, MINUTE, MockApi, MockTokens, Reply, credentials, fleet, push_body};
use x8000_core::{
    Command, CoordinatorConfig, Coordinator, CoreError, CycleOutcome, DeviceId, Hold,
    IntervalMode, NotificationKind, PlantId, PushOutcome,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn setup(ids: &[&str]) -> (Coordinator, Arc<MockApi>, Arc<MockTokens>) {
    let api = Arc::new(MockApi::default());
    let tokens = Arc::new(MockTokens::new(24 * HOUR));
    let coordinator = Coordinator::new(
        CoordinatorConfig::default(),
        fleet(ids),
        api.clone(),
        credentials(tokens.clone()),
    )
    .unwrap();
    (coordinator, api, tokens)
}

fn id(raw: &str) -> DeviceId {
    DeviceId::new(raw)
}

fn assert_near(actual: Instant, expected: Instant) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(diff < Duration::from_secs(1), "off by {diff:?}");
}

// ── Fail-fast policy ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_limit_on_first_device_aborts_the_cycle() {
    let (coordinator, api, _tokens) = setup(&["d1", "d2", "d3"]);
    api.script("d1", [Reply::Temperature(19.0), Reply::RateLimited]);
    let mut events = coordinator.notifications();

    let first = coordinator.poll_cycle().await;
    assert_eq!(
        first,
        CycleOutcome::Completed {
            succeeded: 3,
            failed: vec![]
        }
    );
    assert!(coordinator.snapshots().iter().all(|s| s.available));

    let now = Instant::now();
    let second = coordinator.poll_cycle().await;
    assert_eq!(
        second,
        CycleOutcome::Aborted {
            source_id: "d1".into(),
            kind: NotificationKind::RateLimitExceeded
        }
    );

    // d2 and d3 were not called in the aborted cycle.
    let calls = api.status_calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3].device.as_deref(), Some("d1"));

    // Every device is invalidated, not left stale.
    for snap in coordinator.snapshots().iter() {
        assert!(!snap.available, "{} still available", snap.id);
    }
    assert_eq!(coordinator.snapshot(&id("d1")).unwrap().current_temperature, Some(19.0));

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, NotificationKind::RateLimitExceeded);
    assert_eq!(event.source_id, "d1");
    assert_eq!(event.cooldown_minutes, 60);
    assert!(events.try_recv().is_err(), "exactly one notification per abort");

    let state = coordinator.scheduler_state();
    assert_eq!(state.mode, IntervalMode::Cooldown);
    assert_near(state.cooldown_until.unwrap(), now + HOUR);
    assert_eq!(state.consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn aborted_cycle_schedules_next_at_cooldown_interval() {
    let (coordinator, api, _tokens) = setup(&["d1", "d2", "d3"]);
    api.script("d1", [Reply::RateLimited]);
    let mut scheduler = coordinator.scheduler();

    let t0 = Instant::now();
    coordinator.start().await.unwrap();
    let state = scheduler
        .wait_for(|s| s.cycles == 1 && s.next_cycle_at.is_some_and(|at| at > t0))
        .await
        .unwrap()
        .clone();

    assert_eq!(state.mode, IntervalMode::Cooldown);
    assert_near(state.next_cycle_at.unwrap(), t0 + HOUR);
    assert_eq!(api.status_calls().len(), 1);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cooldown_then_normal_interval_after_recovery() {
    let (coordinator, api, _tokens) = setup(&["d1", "d2"]);
    api.script("d1", [Reply::RateLimited]);
    let mut events = coordinator.notifications();

    let t0 = Instant::now();
    coordinator.start().await.unwrap();
    tokio::time::sleep(HOUR + 6 * MINUTE).await;

    let calls = api.status_calls();
    // t0: d1 (abort) | t0+60m: d1, d2 | t0+65m: d1, d2
    assert_eq!(calls.len(), 5);
    assert_near(calls[0].at, t0);
    assert_near(calls[1].at, t0 + HOUR);
    assert_near(calls[2].at, t0 + HOUR);
    assert_near(calls[3].at, t0 + HOUR + 5 * MINUTE);
    assert!(calls[1].at - calls[0].at >= HOUR);

    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Normal);
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::RateLimitExceeded);
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::CooldownCleared);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_rate_limit_rearms_cooldown() {
    let (coordinator, api, _tokens) = setup(&["d1"]);
    api.script("d1", [Reply::RateLimited, Reply::RateLimited]);
    let mut events = coordinator.notifications();

    coordinator.poll_cycle().await;
    tokio::time::advance(HOUR).await;
    let now = Instant::now();
    coordinator.poll_cycle().await;

    let state = coordinator.scheduler_state();
    assert_eq!(state.mode, IntervalMode::Cooldown);
    assert_near(state.cooldown_until.unwrap(), now + HOUR);
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::RateLimitExceeded);
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::RateLimitExceeded);
}

#[tokio::test(start_paused = true)]
async fn partial_cycle_during_cooldown_stays_in_cooldown() {
    let (coordinator, api, _tokens) = setup(&["d1", "d2"]);
    api.script("d1", [Reply::RateLimited]);
    api.script("d2", [Reply::Malformed]);
    let mut events = coordinator.notifications();

    coordinator.poll_cycle().await;
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::RateLimitExceeded);

    tokio::time::advance(HOUR).await;
    let now = Instant::now();
    let outcome = coordinator.poll_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            succeeded: 1,
            failed: vec![id("d2")]
        }
    );
    let state = coordinator.scheduler_state();
    assert_eq!(state.mode, IntervalMode::Cooldown);
    assert_near(state.cooldown_until.unwrap(), now + HOUR);
    assert!(events.try_recv().is_err());

    tokio::time::advance(HOUR).await;
    coordinator.poll_cycle().await;
    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Normal);
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::CooldownCleared);
}

// ── Per-device degradation ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn malformed_response_does_not_stop_the_cycle() {
    let (coordinator, api, _tokens) = setup(&["d1", "d2", "d3"]);
    api.script("d2", [Reply::Malformed]);
    let mut events = coordinator.notifications();

    let outcome = coordinator.poll_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            succeeded: 2,
            failed: vec![id("d2")]
        }
    );
    assert_eq!(api.status_calls().len(), 3);
    assert!(coordinator.snapshot(&id("d1")).unwrap().available);
    assert!(!coordinator.snapshot(&id("d2")).unwrap().available);
    assert!(coordinator.snapshot(&id("d3")).unwrap().available);
    assert!(events.try_recv().is_err());
    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Normal);
}

#[tokio::test(start_paused = true)]
async fn unknown_mode_and_transient_failures_are_per_device() {
    let (coordinator, api, _tokens) = setup(&["d1", "d2", "d3"]);
    api.script("d1", [Reply::Temperature(18.0), Reply::Transient]);
    api.script("d2", [Reply::Temperature(18.5), Reply::UnknownMode]);

    coordinator.poll_cycle().await;
    let outcome = coordinator.poll_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            succeeded: 1,
            failed: vec![id("d1"), id("d2")]
        }
    );
    assert_eq!(api.status_calls().len(), 6);
    let d2 = coordinator.snapshot(&id("d2")).unwrap();
    assert!(!d2.available);
    assert_eq!(d2.current_temperature, Some(18.5));
    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Normal);
}

#[tokio::test(start_paused = true)]
async fn auth_error_forces_refresh_and_aborts() {
    let (coordinator, api, tokens) = setup(&["d1", "d2", "d3"]);
    api.script("d2", [Reply::Auth]);
    let mut events = coordinator.notifications();

    let outcome = coordinator.poll_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::Aborted {
            source_id: "d2".into(),
            kind: NotificationKind::AuthFailed
        }
    );
    assert_eq!(api.status_calls().len(), 2);
    assert_eq!(tokens.calls().len(), 2, "initial grant plus forced renewal");
    assert_eq!(events.try_recv().unwrap().kind, NotificationKind::AuthFailed);
    assert!(coordinator.snapshots().iter().all(|s| !s.available));
}

#[tokio::test(start_paused = true)]
async fn token_failure_aborts_before_any_call() {
    let (coordinator, api, tokens) = setup(&["d1", "d2"]);
    tokens.set_failing(true);

    let outcome = coordinator.poll_cycle().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Aborted {
            kind: NotificationKind::AuthFailed,
            ..
        }
    ));
    assert!(api.status_calls().is_empty());
    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Cooldown);
}

// ── Push path ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn push_updates_state_without_api_calls() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    coordinator.start().await.unwrap();
    tokio::time::sleep(MINUTE).await;
    let calls_before = api.calls().len();

    let (tx, mut seen) = mpsc::unbounded_channel();
    coordinator
        .observe(&id("sala"), move |snap: &x8000_core::DeviceSnapshot| {
            let _ = tx.send(snap.current_temperature);
        })
        .unwrap();

    let outcome = coordinator.push_receiver().on_push(&push_body("sala", 21.5));
    assert_eq!(outcome, PushOutcome::Queued(1));

    assert_eq!(seen.recv().await.unwrap(), Some(21.5));
    assert_eq!(api.calls().len(), calls_before);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn replayed_push_is_idempotent() {
    let (coordinator, _api, _tokens) = setup(&["sala"]);
    coordinator.start().await.unwrap();
    tokio::time::sleep(MINUTE).await;

    let mut stream = coordinator.subscribe(&id("sala")).unwrap();
    let receiver = coordinator.push_receiver();

    receiver.on_push(&push_body("sala", 22.0));
    let once = stream.changed().await.unwrap();

    receiver.on_push(&push_body("sala", 22.0));
    tokio::time::sleep(MINUTE).await;

    assert!(!stream.has_changed(), "replay must not notify");
    assert_eq!(coordinator.snapshot(&id("sala")).unwrap(), once);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn push_during_cooldown_leaves_scheduler_alone() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    api.script("sala", [Reply::RateLimited]);
    coordinator.start().await.unwrap();
    tokio::time::sleep(MINUTE).await;

    let before = coordinator.scheduler_state();
    assert_eq!(before.mode, IntervalMode::Cooldown);
    assert!(!coordinator.snapshot(&id("sala")).unwrap().available);

    let mut stream = coordinator.subscribe(&id("sala")).unwrap();
    coordinator.push_receiver().on_push(&push_body("sala", 21.0));
    let snap = stream.changed().await.unwrap();

    assert_eq!(snap.current_temperature, Some(21.0));
    assert!(snap.available);
    assert_eq!(coordinator.scheduler_state(), before);
    assert_eq!(api.status_calls().len(), 1);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn due_poll_runs_before_queued_pushes() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    api.script("sala", [Reply::Temperature(18.0), Reply::Temperature(18.0)]);
    let t0 = Instant::now();
    coordinator.start().await.unwrap();

    // Wake on the tick the second poll is due and queue a push at once.
    tokio::time::sleep_until(t0 + 5 * MINUTE).await;
    coordinator.push_receiver().on_push(&push_body("sala", 23.0));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(api.status_calls().len(), 2);
    // The push was merged after the poll, so its reading wins.
    assert_eq!(
        coordinator.snapshot(&id("sala")).unwrap().current_temperature,
        Some(23.0)
    );
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_and_foreign_pushes_are_dropped() {
    let (coordinator, _api, _tokens) = setup(&["sala"]);
    let receiver = coordinator.push_receiver();

    assert_eq!(receiver.on_push(b"{\"unexpected\": true}"), PushOutcome::Discarded);
    assert_eq!(receiver.on_push(b"<html>"), PushOutcome::Discarded);

    coordinator.start().await.unwrap();
    tokio::time::sleep(MINUTE).await;
    let mut stream = coordinator.subscribe(&id("sala")).unwrap();
    receiver.on_push(&push_body("cucina", 30.0));
    tokio::time::sleep(MINUTE).await;
    assert!(!stream.has_changed());
    assert_eq!(
        stream.latest().current_temperature,
        Some(20.0),
        "polled value untouched"
    );
    coordinator.shutdown().await;
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn command_is_one_write_and_leaves_store_alone() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    coordinator.poll_cycle().await;
    let before = coordinator.snapshot(&id("sala")).unwrap();

    coordinator
        .execute(Command::SetTemperature {
            device: id("sala"),
            target: 22.5,
            hold: Hold::Indefinitely,
        })
        .await
        .unwrap();

    let writes = api.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1.mode, "manual");
    assert_eq!(writes[0].1.set_point.as_ref().unwrap().value, 22.5);
    assert_eq!(coordinator.snapshot(&id("sala")).unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn commands_rejected_while_cooling_down() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    api.script("sala", [Reply::RateLimited]);
    coordinator.poll_cycle().await;

    let err = coordinator
        .execute(Command::CancelBoost { device: id("sala") })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::CoolingDown { remaining_secs } if remaining_secs > 0));
    assert!(api.writes().is_empty());
    assert!(api.calls().iter().all(|c| c.op != "write"));
}

#[tokio::test(start_paused = true)]
async fn command_auth_failure_renews_credential() {
    let (coordinator, api, tokens) = setup(&["sala"]);
    api.fail_writes_with(Reply::Auth);

    let err = coordinator
        .execute(Command::SetProgram {
            device: id("sala"),
            program: 2,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(tokens.calls().len(), 2);
    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Normal);
}

#[tokio::test(start_paused = true)]
async fn command_for_unknown_device_fails_without_calls() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    let err = coordinator
        .execute(Command::TurnOff {
            device: id("garage"),
            hold: Hold::Indefinitely,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
    assert!(api.calls().is_empty());
}

// ── Discovery, push registration, diagnostics ───────────────────────

#[tokio::test(start_paused = true)]
async fn discovery_lists_chronothermostats_with_programs() {
    let (coordinator, _api, _tokens) = setup(&["sala"]);
    let found = coordinator.discover().await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id("sala"));
    assert_eq!(found[0].plant_id, PlantId::new("p1"));
    assert_eq!(found[0].name, "Sala");
    assert_eq!(found[0].program_name(1), Some("Comfort"));
}

#[tokio::test(start_paused = true)]
async fn conflict_clears_only_our_stale_subscriptions() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    api.add_subscription("stale", "p1", "https://old.example/api/webhook/abc");
    api.add_subscription("foreign", "p1", "https://elsewhere.example/hook");
    api.conflict_on_next_subscribe();

    let sub_id = coordinator
        .register_push_endpoint(&PlantId::new("p1"), "https://home.example/api/webhook/xyz")
        .await
        .unwrap();

    let remaining: Vec<String> = api
        .subscriptions()
        .into_iter()
        .map(|s| s.subscription_id)
        .collect();
    assert_eq!(remaining, vec!["foreign".to_string(), sub_id.clone()]);

    let removed = coordinator
        .remove_push_endpoints(&PlantId::new("p1"), "https://home.example")
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(coordinator.list_push_endpoints().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn push_registration_before_start_is_not_blocked() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    api.script("sala", [Reply::RateLimited]);

    let pending = coordinator
        .keep_push_registered(vec![PlantId::new("p1")], "https://home.example/hook".into())
        .await;
    coordinator.start().await.unwrap();
    tokio::time::sleep(MINUTE).await;

    assert!(pending.is_empty());
    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Cooldown);
    assert_eq!(api.subscriptions().len(), 1);
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn push_registration_retried_once_cooldown_clears() {
    let (coordinator, api, _tokens) = setup(&["sala"]);
    api.script("sala", [Reply::RateLimited]);
    coordinator.poll_cycle().await;

    let pending = coordinator
        .keep_push_registered(vec![PlantId::new("p1")], "https://home.example/hook".into())
        .await;
    assert_eq!(pending, vec![PlantId::new("p1")]);
    assert!(api.calls().iter().all(|c| c.op != "subscribe"));

    tokio::time::sleep(20 * MINUTE).await;
    assert!(api.subscriptions().is_empty());

    // A clean cycle ends the cooldown well before the retry timer is due.
    coordinator.poll_cycle().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(coordinator.scheduler_state().mode, IntervalMode::Normal);
    let subscriptions = api.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].endpoint_url, "https://home.example/hook");
    coordinator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn diagnostics_reflect_cycle_and_token() {
    let (coordinator, _api, _tokens) = setup(&["d1", "d2"]);
    coordinator.poll_cycle().await;

    let diag = coordinator.diagnostics();
    assert_eq!(diag.mode, IntervalMode::Normal);
    assert_eq!(diag.cycles, 1);
    assert_eq!(diag.devices, 2);
    assert_eq!(diag.available, 2);
    assert_eq!(diag.token_generation, Some(1));
    assert_eq!(diag.refresh_attempts, 1);
    assert!(diag.last_poll.is_some());
    assert!(diag.last_push.is_none());
    assert!(diag.requests.is_none());
}
