// ── Central reactive state store ──
//
// One `watch` channel per fleet device plus one for the whole fleet.
// Writers are the coordinator's poll cycle and its push handler, both
// running on the coordinator task; readers subscribe and are woken on
// their own tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{DeviceId, DeviceSnapshot, Fleet, SnapshotUpdate};
use crate::stream::{DeviceStream, FleetStream, SnapshotStream};

pub struct DataStore {
    devices: IndexMap<DeviceId, watch::Sender<Arc<DeviceSnapshot>>>,
    fleet: watch::Sender<Arc<Vec<Arc<DeviceSnapshot>>>>,
    last_poll: watch::Sender<Option<DateTime<Utc>>>,
    last_push: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    /// Create one empty, unavailable snapshot per fleet device.
    pub fn new(fleet: &Fleet) -> Self {
        let devices: IndexMap<_, _> = fleet
            .iter()
            .map(|entry| {
                let (tx, _) = watch::channel(Arc::new(DeviceSnapshot::empty(entry)));
                (entry.id.clone(), tx)
            })
            .collect();
        let initial: Vec<Arc<DeviceSnapshot>> =
            devices.values().map(|tx| tx.borrow().clone()).collect();
        let (fleet_tx, _) = watch::channel(Arc::new(initial));
        let (last_poll, _) = watch::channel(None);
        let (last_push, _) = watch::channel(None);

        Self {
            devices,
            fleet: fleet_tx,
            last_poll,
            last_push,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn snapshot(&self, id: &DeviceId) -> Option<Arc<DeviceSnapshot>> {
        self.devices.get(id).map(|tx| tx.borrow().clone())
    }

    /// All snapshots in fleet order.
    pub fn snapshots(&self) -> Arc<Vec<Arc<DeviceSnapshot>>> {
        self.fleet.borrow().clone()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn available_count(&self) -> usize {
        self.devices
            .values()
            .filter(|tx| tx.borrow().available)
            .count()
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_poll.borrow()
    }

    pub fn last_push(&self) -> Option<DateTime<Utc>> {
        *self.last_push.borrow()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to one device. `None` if it is not in the fleet.
    pub fn subscribe(&self, id: &DeviceId) -> Option<DeviceStream> {
        self.devices
            .get(id)
            .map(|tx| SnapshotStream::new(tx.subscribe()))
    }

    pub fn subscribe_all(&self) -> FleetStream {
        SnapshotStream::new(self.fleet.subscribe())
    }

    // ── Mutations (coordinator only) ─────────────────────────────────

    /// Merge observed fields into a device. Returns `true` if anything changed.
    ///
    /// Re-applying an update that changes nothing leaves the snapshot,
    /// including `last_updated`, untouched and wakes no one.
    pub(crate) fn merge(&self, id: &DeviceId, update: &SnapshotUpdate, at: DateTime<Utc>) -> bool {
        self.modify(id, |current| {
            let mut next = current.merged(update);
            if next.same_state(current) {
                return None;
            }
            next.last_updated = Some(at);
            Some(next)
        })
    }

    /// Flag one device as having no live data. Returns `true` if it was available.
    pub(crate) fn mark_unavailable(&self, id: &DeviceId) -> bool {
        self.modify(id, |current| {
            current.available.then(|| {
                let mut next = current.clone();
                next.available = false;
                next
            })
        })
    }

    /// Flag every device as having no live data.
    pub(crate) fn invalidate_all(&self) {
        let ids: Vec<DeviceId> = self.devices.keys().cloned().collect();
        for id in &ids {
            self.mark_unavailable(id);
        }
    }

    pub(crate) fn record_poll(&self, at: DateTime<Utc>) {
        self.last_poll.send_replace(Some(at));
    }

    pub(crate) fn record_push(&self, at: DateTime<Utc>) {
        self.last_push.send_replace(Some(at));
    }

    fn modify(
        &self,
        id: &DeviceId,
        f: impl FnOnce(&DeviceSnapshot) -> Option<DeviceSnapshot>,
    ) -> bool {
        let Some(tx) = self.devices.get(id) else {
            return false;
        };
        let changed = tx.send_if_modified(|slot| match f(&**slot) {
            Some(next) => {
                *slot = Arc::new(next);
                true
            }
            None => false,
        });
        if changed {
            debug!(device = %id, "snapshot changed");
            self.publish_fleet();
        }
        changed
    }

    fn publish_fleet(&self) {
        let all: Vec<Arc<DeviceSnapshot>> =
            self.devices.values().map(|tx| tx.borrow().clone()).collect();
        self.fleet.send_replace(Arc::new(all));
    }
}
