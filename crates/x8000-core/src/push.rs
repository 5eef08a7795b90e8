// ── Push receiver ──
//
// Inbound webhook bodies are parsed on the caller's task and queued to
// the coordinator, which merges them on its own task. Nothing here ever
// calls the cloud service or touches scheduler state.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use x8000_api::push::{PushItem, parse_push};

use crate::convert;
use crate::model::{DeviceId, Fleet};
use crate::store::DataStore;

/// What happened to one delivered payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued with this many device items.
    Queued(usize),
    /// Malformed, empty, or dropped because the queue was full.
    Discarded,
}

pub(crate) struct PushBatch {
    items: Vec<PushItem>,
    received_at: DateTime<Utc>,
}

/// Entry point for the inbound delivery path. Cheap to clone.
#[derive(Clone)]
pub struct PushReceiver {
    tx: mpsc::Sender<PushBatch>,
}

impl PushReceiver {
    pub(crate) fn new(tx: mpsc::Sender<PushBatch>) -> Self {
        Self { tx }
    }

    /// Accept a raw push body. Never fails; bad payloads are logged and dropped.
    pub fn on_push(&self, raw: &[u8]) -> PushOutcome {
        let items = match parse_push(raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "discarding malformed push payload");
                return PushOutcome::Discarded;
            }
        };
        if items.is_empty() {
            debug!("push payload carried no usable items");
            return PushOutcome::Discarded;
        }

        let count = items.len();
        let batch = PushBatch {
            items,
            received_at: Utc::now(),
        };
        match self.tx.try_send(batch) {
            Ok(()) => {
                debug!(items = count, "push payload queued");
                PushOutcome::Queued(count)
            }
            Err(TrySendError::Full(_)) => {
                warn!("push queue full, dropping payload");
                PushOutcome::Discarded
            }
            Err(TrySendError::Closed(_)) => {
                warn!("coordinator stopped, dropping push payload");
                PushOutcome::Discarded
            }
        }
    }
}

/// Merge one queued batch. Returns the number of snapshots that changed.
pub(crate) fn apply(store: &DataStore, fleet: &Fleet, batch: PushBatch) -> usize {
    let mut changed = 0;
    for item in batch.items {
        let id = DeviceId::new(item.module_id);
        let Some(entry) = fleet.get(&id) else {
            debug!(device = %id, "ignoring push for a device outside the fleet");
            continue;
        };
        match convert::to_update(&item.status, entry) {
            Ok(update) => {
                if store.merge(&id, &update, batch.received_at) {
                    changed += 1;
                }
            }
            Err(message) => warn!(device = %id, %message, "discarding push item"),
        }
    }
    store.record_push(batch.received_at);
    changed
}
