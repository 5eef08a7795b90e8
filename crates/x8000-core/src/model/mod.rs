// ── Domain model ──
//
// Canonical representation of the managed fleet and of each
// thermostat's last known state, independent of the wire format.

pub mod device;
pub mod fleet;
pub mod id;

pub use device::{
    ActiveProgram, DeviceSnapshot, LoadState, OperatingMode, SnapshotUpdate, ThermalFunction,
};
pub use fleet::{Fleet, FleetEntry, ProgramInfo};
pub use id::{DeviceId, PlantId};
