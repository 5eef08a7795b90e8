// ── Fleet registry ──
//
// The ordered, immutable set of thermostats one coordinator manages.
// Poll cycles walk it front to back; membership changes require a new
// coordinator.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::id::{DeviceId, PlantId};
use crate::error::CoreError;

/// A named program stored on the thermostat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInfo {
    pub number: u32,
    pub name: String,
}

/// One managed thermostat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetEntry {
    pub id: DeviceId,
    pub plant_id: PlantId,
    pub name: String,
    #[serde(default)]
    pub programs: Vec<ProgramInfo>,
}

impl FleetEntry {
    pub fn new(id: impl Into<DeviceId>, plant_id: impl Into<PlantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plant_id: plant_id.into(),
            name: name.into(),
            programs: Vec::new(),
        }
    }

    pub fn with_programs(mut self, programs: Vec<ProgramInfo>) -> Self {
        self.programs = programs;
        self
    }

    pub fn program_name(&self, number: u32) -> Option<&str> {
        self.programs
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.name.as_str())
    }

    /// Program to fall back on when the device has not reported one.
    pub fn default_program(&self) -> u32 {
        self.programs.first().map_or(1, |p| p.number)
    }
}

/// Ordered fleet, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    entries: Arc<IndexMap<DeviceId, FleetEntry>>,
}

impl Fleet {
    /// Build a fleet, rejecting duplicate device ids.
    pub fn new(entries: impl IntoIterator<Item = FleetEntry>) -> Result<Self, CoreError> {
        let mut map = IndexMap::new();
        for entry in entries {
            if map.contains_key(&entry.id) {
                return Err(CoreError::ValidationFailed {
                    message: format!("device {} listed twice", entry.id),
                });
            }
            map.insert(entry.id.clone(), entry);
        }
        Ok(Self {
            entries: Arc::new(map),
        })
    }

    pub fn get(&self, id: &DeviceId) -> Option<&FleetEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.entries.contains_key(id)
    }

    /// Entries in poll order.
    pub fn iter(&self) -> impl Iterator<Item = &FleetEntry> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.entries.keys()
    }

    /// Distinct plants, in first-seen order.
    pub fn plants(&self) -> Vec<PlantId> {
        let mut plants: Vec<PlantId> = Vec::new();
        for entry in self.entries.values() {
            if !plants.contains(&entry.plant_id) {
                plants.push(entry.plant_id.clone());
            }
        }
        plants
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
