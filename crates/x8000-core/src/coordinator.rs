// ── Coordinator ──
//
// Owns the poll loop, the push queue and the scheduler state for one
// account. The poll loop and push merges run on a single task, so the
// DataStore always has exactly one writer.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use x8000_api::{ApiClient, MetricsSnapshot, OAuthClient, TransportConfig};

use crate::api::{ThermostatApi, TokenSource};
use crate::command::{Command, payload};
use crate::config::{AccountConfig, CoordinatorConfig};
use crate::convert;
use crate::credentials::{CredentialManager, Token};
use crate::error::CoreError;
use crate::model::{DeviceId, DeviceSnapshot, Fleet, FleetEntry, PlantId, ProgramInfo};
use crate::notification::{Notification, NotificationKind};
use crate::push::{self, PushBatch, PushReceiver};
use crate::scheduler::{IntervalMode, SchedulerState};
use crate::store::DataStore;
use crate::stream::{DeviceStream, FleetStream};
use crate::subscription;

const NOTIFICATION_CHANNEL_SIZE: usize = 256;

// ── Public result types ──────────────────────────────────────────────

/// How one poll cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every device was visited. `failed` lists per-device degradations.
    Completed {
        succeeded: usize,
        failed: Vec<DeviceId>,
    },
    /// Stopped at `source_id` on an account-wide failure.
    Aborted {
        source_id: String,
        kind: NotificationKind,
    },
}

/// Point-in-time health report.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub mode: IntervalMode,
    pub consecutive_failures: u32,
    pub cooldown_remaining_secs: Option<u64>,
    pub next_cycle_in_secs: Option<u64>,
    pub cycles: u64,
    pub devices: usize,
    pub available: usize,
    pub token_generation: Option<u64>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub refresh_attempts: u64,
    pub requests: Option<MetricsSnapshot>,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_push: Option<DateTime<Utc>>,
}

/// Receives snapshot changes for one device, always on a task spawned
/// by [`Coordinator::observe`].
pub trait DeviceObserver: Send + 'static {
    fn on_update(&mut self, snapshot: &DeviceSnapshot);
}

impl<F> DeviceObserver for F
where
    F: FnMut(&DeviceSnapshot) + Send + 'static,
{
    fn on_update(&mut self, snapshot: &DeviceSnapshot) {
        self(snapshot);
    }
}

// ── Coordinator ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. Call
/// [`start()`](Self::start) to begin polling and renewal.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    fleet: Fleet,
    api: Arc<dyn ThermostatApi>,
    credentials: CredentialManager,
    store: Arc<DataStore>,
    scheduler: watch::Sender<SchedulerState>,
    notifications: broadcast::Sender<Notification>,
    push_tx: mpsc::Sender<PushBatch>,
    push_rx: Mutex<Option<mpsc::Receiver<PushBatch>>>,
    cycle_lock: Mutex<()>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Assemble a coordinator from its collaborators. Does not start
    /// any task and makes no call.
    pub fn new(
        config: CoordinatorConfig,
        fleet: Fleet,
        api: Arc<dyn ThermostatApi>,
        credentials: CredentialManager,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        if fleet.is_empty() {
            warn!("coordinator created with an empty fleet");
        }

        let store = Arc::new(DataStore::new(&fleet));
        let (scheduler, _) = watch::channel(SchedulerState::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let (push_tx, push_rx) = mpsc::channel(config.push_queue_capacity);

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                config,
                fleet,
                api,
                credentials,
                store,
                scheduler,
                notifications,
                push_tx,
                push_rx: Mutex::new(Some(push_rx)),
                cycle_lock: Mutex::new(()),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Build the HTTP stack for `account` and assemble a coordinator.
    ///
    /// The API client and the token endpoint share one connection pool.
    pub fn from_account(
        account: &AccountConfig,
        config: CoordinatorConfig,
        fleet: Fleet,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: account.timeout,
            ..TransportConfig::default()
        };
        let http = transport.build_client()?;
        let api = ApiClient::new(
            http.clone(),
            account.api_base_url.clone(),
            account.subscription_key.clone(),
            &transport,
        );
        let oauth = OAuthClient::new(
            http,
            account.token_url.clone(),
            account.client_id.clone(),
            account.client_secret.clone(),
        );
        let source: Arc<dyn TokenSource> = Arc::new(oauth);
        let credentials =
            CredentialManager::new(source, account.refresh_token.clone(), &config);
        Self::new(config, fleet, Arc::new(api), credentials)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn fleet(&self) -> &Fleet {
        &self.inner.fleet
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.inner.credentials
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the poll loop and the token renewal task. The first poll
    /// cycle runs immediately.
    pub async fn start(&self) -> Result<(), CoreError> {
        let push_rx = self
            .inner
            .push_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::Internal("coordinator already started".into()))?;

        let now = Instant::now();
        self.inner
            .scheduler
            .send_modify(|state| state.next_cycle_at = Some(now));

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(
            self.inner
                .credentials
                .spawn_renewal(self.inner.cancel.child_token()),
        );
        handles.push(tokio::spawn(run_loop(
            self.clone(),
            push_rx,
            self.inner.cancel.clone(),
        )));

        info!(devices = self.inner.fleet.len(), "coordinator started");
        Ok(())
    }

    /// Cancel background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("coordinator stopped");
    }

    // ── Poll cycle ───────────────────────────────────────────────────

    /// Poll every device once, in fleet order.
    ///
    /// Rate limiting or an authentication failure stops the cycle at
    /// once: no further device is called, every snapshot is marked
    /// unavailable and one notification is emitted. Any other failure
    /// only affects the device it came from.
    pub async fn poll_cycle(&self) -> CycleOutcome {
        let _cycle = self.inner.cycle_lock.lock().await;
        let mut succeeded = 0;
        let mut failed = Vec::new();

        for entry in self.inner.fleet.iter() {
            let token = match self.inner.credentials.valid_token().await {
                Ok(token) => token,
                Err(e) => {
                    return self.abort(NotificationKind::AuthFailed, entry.id.to_string(), &e);
                }
            };

            let result = self
                .inner
                .api
                .chronothermostat_status(&entry.plant_id, &entry.id, &token)
                .await;

            match result {
                Ok(status) => match convert::to_update(&status, entry) {
                    Ok(update) => {
                        debug!(device = %entry.id, "status merged");
                        self.inner.store.merge(&entry.id, &update, Utc::now());
                        succeeded += 1;
                    }
                    Err(message) => {
                        warn!(device = %entry.id, %message, "unusable status, marking unavailable");
                        self.inner.store.mark_unavailable(&entry.id);
                        failed.push(entry.id.clone());
                    }
                },
                Err(e) if e.is_rate_limited() => {
                    let source = e.source_id().unwrap_or(entry.id.as_str()).to_owned();
                    return self.abort(NotificationKind::RateLimitExceeded, source, &e);
                }
                Err(e) if e.is_auth() => {
                    if let Err(refresh) = self.inner.credentials.force_refresh().await {
                        warn!(error = %refresh, "forced token refresh failed");
                    }
                    return self.abort(NotificationKind::AuthFailed, entry.id.to_string(), &e);
                }
                Err(e) => {
                    warn!(device = %entry.id, error = %e, "poll failed, marking unavailable");
                    self.inner.store.mark_unavailable(&entry.id);
                    failed.push(entry.id.clone());
                }
            }
        }

        let now = Instant::now();
        let cooldown = self.inner.config.cooldown_interval;
        let failed_count = failed.len();
        let mut cleared = false;
        self.inner.scheduler.send_modify(|state| {
            cleared = state.finish_cycle(succeeded, failed_count, now, cooldown);
        });
        self.inner.store.record_poll(Utc::now());

        if cleared {
            info!("all devices answered, leaving cooldown");
            self.emit(Notification::new(
                NotificationKind::CooldownCleared,
                "account",
                "",
                0,
            ));
        }
        debug!(succeeded, failed = failed_count, "poll cycle complete");
        CycleOutcome::Completed { succeeded, failed }
    }

    fn abort(
        &self,
        kind: NotificationKind,
        source_id: String,
        cause: &dyn std::fmt::Display,
    ) -> CycleOutcome {
        let cooldown = self.inner.config.cooldown_interval;
        error!(
            source = %source_id,
            %kind,
            error = %cause,
            cooldown_minutes = self.inner.config.cooldown_minutes(),
            "account-wide failure, aborting poll cycle"
        );

        self.inner.store.invalidate_all();
        let now = Instant::now();
        self.inner
            .scheduler
            .send_modify(|state| state.abort_cycle(now, cooldown));
        self.inner.store.record_poll(Utc::now());

        self.emit(Notification::new(
            kind,
            source_id.clone(),
            cause.to_string(),
            self.inner.config.cooldown_minutes(),
        ));
        CycleOutcome::Aborted { source_id, kind }
    }

    /// Record when the next cycle is due and return that instant.
    fn schedule_next(&self) -> Instant {
        let now = Instant::now();
        let normal = self.inner.config.normal_interval;
        let cooldown = self.inner.config.cooldown_interval;
        let mut next = now;
        self.inner.scheduler.send_modify(|state| {
            next = now + state.interval(normal, cooldown);
            state.next_cycle_at = Some(next);
        });
        next
    }

    fn emit(&self, notification: Notification) {
        // No receivers is fine.
        let _ = self.inner.notifications.send(notification);
    }

    // ── Push ─────────────────────────────────────────────────────────

    /// Handle for the inbound delivery path (webhook listener).
    pub fn push_receiver(&self) -> PushReceiver {
        PushReceiver::new(self.inner.push_tx.clone())
    }

    fn apply_push(&self, batch: PushBatch) {
        let changed = push::apply(&self.inner.store, &self.inner.fleet, batch);
        debug!(changed, "push applied");
    }

    // ── State access ─────────────────────────────────────────────────

    pub fn snapshot(&self, id: &DeviceId) -> Result<Arc<DeviceSnapshot>, CoreError> {
        self.inner
            .store
            .snapshot(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })
    }

    pub fn snapshots(&self) -> Arc<Vec<Arc<DeviceSnapshot>>> {
        self.inner.store.snapshots()
    }

    pub fn subscribe(&self, id: &DeviceId) -> Result<DeviceStream, CoreError> {
        self.inner
            .store
            .subscribe(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })
    }

    pub fn subscribe_all(&self) -> FleetStream {
        self.inner.store.subscribe_all()
    }

    /// Forward every change of `id` to `observer` on a dedicated task.
    ///
    /// Intermediate values may be coalesced; the observer always sees
    /// the latest snapshot. The task ends on shutdown.
    pub fn observe(
        &self,
        id: &DeviceId,
        mut observer: impl DeviceObserver,
    ) -> Result<JoinHandle<()>, CoreError> {
        let mut stream = self.subscribe(id)?;
        let cancel = self.inner.cancel.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    snapshot = stream.changed() => match snapshot {
                        Some(snapshot) => observer.on_update(&snapshot),
                        None => break,
                    },
                }
            }
        }))
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.borrow().clone()
    }

    pub fn scheduler(&self) -> watch::Receiver<SchedulerState> {
        self.inner.scheduler.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let now = Instant::now();
        let state = self.scheduler_state();
        let token = self.inner.credentials.current();
        Diagnostics {
            mode: state.mode,
            consecutive_failures: state.consecutive_failures,
            cooldown_remaining_secs: state.cooldown_remaining(now).map(|d| d.as_secs()),
            next_cycle_in_secs: state
                .next_cycle_at
                .map(|at| at.saturating_duration_since(now).as_secs()),
            cycles: state.cycles,
            devices: self.inner.store.device_count(),
            available: self.inner.store.available_count(),
            token_generation: token.as_ref().map(|t| t.generation),
            token_expires_at: token.as_ref().map(|t| t.expires_at_utc),
            refresh_attempts: self.inner.credentials.refresh_attempts(),
            requests: self.inner.api.metrics(),
            last_poll: self.inner.store.last_poll(),
            last_push: self.inner.store.last_push(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send one command as exactly one status write.
    ///
    /// The store is not updated; the new state arrives by push or the
    /// next poll.
    pub async fn execute(&self, command: Command) -> Result<(), CoreError> {
        let entry = self.entry(command.device())?;
        self.ensure_not_cooling_down()?;

        let snapshot = self.inner.store.snapshot(&entry.id);
        let update = payload::build(&command, entry, snapshot.as_deref(), Local::now())?;
        let token = self.inner.credentials.valid_token().await?;

        info!(device = %entry.id, command = command.name(), "sending command");
        let result = self
            .inner
            .api
            .set_chronothermostat_status(&entry.plant_id, &entry.id, &update, &token)
            .await;
        self.settle(result).await
    }

    /// Renew the access token now.
    pub async fn force_token_refresh(&self) -> Result<Arc<Token>, CoreError> {
        self.inner.credentials.force_refresh().await
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Enumerate every chronothermostat visible to the account,
    /// with its program list, as candidate fleet entries.
    pub async fn discover(&self) -> Result<Vec<FleetEntry>, CoreError> {
        self.ensure_not_cooling_down()?;
        let token = self.inner.credentials.valid_token().await?;
        let api = &self.inner.api;

        let plants = self.settle(api.plants(&token).await).await?;
        let mut found = Vec::new();
        for plant in plants {
            let plant_id = PlantId::new(plant.id);
            let topology = self.settle(api.topology(&plant_id, &token).await).await?;

            for module in topology.modules.into_iter().filter(|m| m.is_chronothermostat()) {
                let device_id = DeviceId::new(module.id);
                let programs = self
                    .settle(api.program_list(&plant_id, &device_id, &token).await)
                    .await?
                    .into_iter()
                    .map(|p| ProgramInfo {
                        number: p.number,
                        name: p.name,
                    })
                    .collect();
                let name = if module.name.is_empty() {
                    device_id.to_string()
                } else {
                    module.name
                };
                debug!(plant = %plant_id, device = %device_id, "discovered thermostat");
                found.push(FleetEntry::new(device_id, plant_id.clone(), name).with_programs(programs));
            }
        }
        info!(count = found.len(), "discovery complete");
        Ok(found)
    }

    // ── Push registration ────────────────────────────────────────────

    /// Register `endpoint_url` for push delivery of `plant`'s events.
    pub async fn register_push_endpoint(
        &self,
        plant: &PlantId,
        endpoint_url: &str,
    ) -> Result<String, CoreError> {
        self.ensure_not_cooling_down()?;
        let token = self.inner.credentials.valid_token().await?;
        let result =
            subscription::register(self.inner.api.as_ref(), &token, plant, endpoint_url).await;
        self.settle(result).await
    }

    /// Remove every registration of `plant` pointing at `external_url`.
    pub async fn remove_push_endpoints(
        &self,
        plant: &PlantId,
        external_url: &str,
    ) -> Result<usize, CoreError> {
        self.ensure_not_cooling_down()?;
        let token = self.inner.credentials.valid_token().await?;
        let result =
            subscription::remove_all(self.inner.api.as_ref(), &token, plant, external_url).await;
        self.settle(result).await
    }

    pub async fn list_push_endpoints(
        &self,
    ) -> Result<Vec<x8000_api::models::Subscription>, CoreError> {
        self.ensure_not_cooling_down()?;
        let token = self.inner.credentials.valid_token().await?;
        let result = self.inner.api.list_subscriptions(&token).await;
        self.settle(result).await
    }

    /// Register `endpoint_url` for every plant in `plants`.
    ///
    /// The first attempt completes before this returns, and the plants it
    /// could not register are returned. Those are retried on a background
    /// task whenever a cooldown clears, and otherwise once per cooldown
    /// interval, until all are registered or the coordinator shuts down.
    pub async fn keep_push_registered(
        &self,
        plants: Vec<PlantId>,
        endpoint_url: String,
    ) -> Vec<PlantId> {
        // Subscribe first so a CooldownCleared during the attempt is seen.
        let mut events = self.notifications();
        let pending = self.register_each(plants, &endpoint_url).await;
        if pending.is_empty() {
            return pending;
        }

        let coordinator = self.clone();
        let cancel = self.inner.cancel.child_token();
        let mut retry = pending.clone();
        let handle = tokio::spawn(async move {
            let interval = coordinator.inner.config.cooldown_interval;
            let mut deadline = Instant::now() + interval;
            while !retry.is_empty() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(n) if n.kind == NotificationKind::CooldownCleared => {}
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    () = tokio::time::sleep_until(deadline) => {}
                }
                retry = coordinator.register_each(retry, &endpoint_url).await;
                deadline = Instant::now() + interval;
            }
            debug!("push registration task finished");
        });
        self.inner.task_handles.lock().await.push(handle);
        pending
    }

    async fn register_each(&self, plants: Vec<PlantId>, endpoint_url: &str) -> Vec<PlantId> {
        let mut pending = Vec::new();
        for plant in plants {
            match self.register_push_endpoint(&plant, endpoint_url).await {
                Ok(id) => info!(%plant, subscription = %id, "push subscription active"),
                Err(e) => {
                    warn!(%plant, error = %e, "push registration failed, polling continues");
                    pending.push(plant);
                }
            }
        }
        pending
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn entry(&self, id: &DeviceId) -> Result<&FleetEntry, CoreError> {
        self.inner
            .fleet
            .get(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })
    }

    fn ensure_not_cooling_down(&self) -> Result<(), CoreError> {
        let remaining = self
            .inner
            .scheduler
            .borrow()
            .cooldown_remaining(Instant::now());
        match remaining {
            Some(left) => Err(CoreError::CoolingDown {
                remaining_secs: left.as_secs(),
            }),
            None => Ok(()),
        }
    }

    /// Translate a call result, renewing the credential first on an
    /// authentication failure.
    async fn settle<T>(&self, result: Result<T, x8000_api::Error>) -> Result<T, CoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_auth() {
                    if let Err(refresh) = self.inner.credentials.force_refresh().await {
                        warn!(error = %refresh, "forced token refresh failed");
                    }
                }
                Err(e.into())
            }
        }
    }
}

// ── Background task ──────────────────────────────────────────────────

/// Poll on the scheduler's interval and merge queued pushes in between.
async fn run_loop(
    coordinator: Coordinator,
    mut push_rx: mpsc::Receiver<PushBatch>,
    cancel: CancellationToken,
) {
    let mut next_poll = Instant::now();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep_until(next_poll) => {
                coordinator.poll_cycle().await;
                next_poll = coordinator.schedule_next();
            }
            batch = push_rx.recv() => {
                let Some(batch) = batch else { break };
                coordinator.apply_push(batch);
            }
        }
    }
}
