// ── Command API ──
//
// All writes to a thermostat flow through the `Command` enum. The
// coordinator turns each one into exactly one status write; commands
// never touch the DataStore, new state arrives by push or poll.

pub mod payload;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::model::DeviceId;

/// Lowest accepted target temperature, in °C.
pub const MIN_TARGET: f64 = 7.0;
/// Highest accepted target temperature, in °C.
pub const MAX_TARGET: f64 = 40.0;

/// How long a manual setting or an off state lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hold {
    #[default]
    Indefinitely,
    For(Duration),
    Until(DateTime<Local>),
}

impl Hold {
    /// End of the hold relative to `now`, `None` when indefinite.
    pub fn end(&self, now: DateTime<Local>) -> Result<Option<DateTime<Local>>, CoreError> {
        match *self {
            Self::Indefinitely => Ok(None),
            Self::For(duration) => {
                let too_large = || CoreError::ValidationFailed {
                    message: format!("hold duration {duration:?} is too large"),
                };
                let delta = chrono::TimeDelta::from_std(duration).map_err(|_| too_large())?;
                now.checked_add_signed(delta).map(Some).ok_or_else(too_large)
            }
            Self::Until(end) if end <= now => Err(CoreError::ValidationFailed {
                message: format!("hold end {end} is in the past"),
            }),
            Self::Until(end) => Ok(Some(end)),
        }
    }
}

/// The boost lengths the thermostat supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoostDuration {
    Minutes30,
    Minutes60,
    Minutes90,
}

impl BoostDuration {
    pub fn minutes(self) -> u32 {
        match self {
            Self::Minutes30 => 30,
            Self::Minutes60 => 60,
            Self::Minutes90 => 90,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }
}

impl TryFrom<u32> for BoostDuration {
    type Error = CoreError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            30 => Ok(Self::Minutes30),
            60 => Ok(Self::Minutes60),
            90 => Ok(Self::Minutes90),
            other => Err(CoreError::ValidationFailed {
                message: format!("boost duration must be 30, 60 or 90 minutes, got {other}"),
            }),
        }
    }
}

impl fmt::Display for BoostDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.minutes())
    }
}

/// High-level climate mode, as offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ClimateMode {
    Auto,
    Heat,
    Cool,
    Off,
}

/// All write operations against a thermostat.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTemperature {
        device: DeviceId,
        target: f64,
        hold: Hold,
    },
    SetBoost {
        device: DeviceId,
        duration: BoostDuration,
    },
    CancelBoost {
        device: DeviceId,
    },
    SetProgram {
        device: DeviceId,
        program: u32,
    },
    TurnOff {
        device: DeviceId,
        hold: Hold,
    },
    SetMode {
        device: DeviceId,
        mode: ClimateMode,
    },
}

impl Command {
    pub fn device(&self) -> &DeviceId {
        match self {
            Self::SetTemperature { device, .. }
            | Self::SetBoost { device, .. }
            | Self::CancelBoost { device }
            | Self::SetProgram { device, .. }
            | Self::TurnOff { device, .. }
            | Self::SetMode { device, .. } => device,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTemperature { .. } => "set_temperature",
            Self::SetBoost { .. } => "set_boost",
            Self::CancelBoost { .. } => "cancel_boost",
            Self::SetProgram { .. } => "set_program",
            Self::TurnOff { .. } => "turn_off",
            Self::SetMode { .. } => "set_mode",
        }
    }
}
