// x8000-core: Resilient coordination layer between x8000-api and consumers (CLI/webhook).

pub mod api;
pub mod command;
pub mod config;
pub mod convert;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod model;
pub mod notification;
pub mod push;
pub mod scheduler;
pub mod store;
pub mod stream;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::{ThermostatApi, TokenSource};
pub use command::{BoostDuration, ClimateMode, Command, Hold};
pub use config::{AccountConfig, CoordinatorConfig};
pub use coordinator::{CycleOutcome, Coordinator, Diagnostics, DeviceObserver};
pub use credentials::{CredentialManager, Token};
pub use error::CoreError;
pub use notification::{Notification, NotificationKind};
pub use push::{PushOutcome, PushReceiver};
pub use scheduler::{IntervalMode, SchedulerState};
pub use store::DataStore;
pub use stream::{DeviceStream, FleetStream, SnapshotStream};

pub use model::{
    ActiveProgram, DeviceId, DeviceSnapshot, Fleet, FleetEntry, LoadState, OperatingMode, PlantId,
    ProgramInfo, SnapshotUpdate, ThermalFunction,
};

pub use x8000_api::AccessToken;
