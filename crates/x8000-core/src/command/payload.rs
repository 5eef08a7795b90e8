// ── Status-write payloads ──
//
// Builds the `StatusUpdate` body for a command. Pure: the caller
// supplies the fleet entry, the last snapshot and the local clock.

use chrono::{DateTime, Local, TimeDelta};

use x8000_api::models::{ProgramNumber, SetPoint, StatusUpdate};

use super::{ClimateMode, Command, Hold, MAX_TARGET, MIN_TARGET};
use crate::convert::format_local;
use crate::error::CoreError;
use crate::model::{DeviceSnapshot, FleetEntry, ThermalFunction};

/// Set point used when switching to manual without a known target.
const FALLBACK_TARGET: f64 = 20.0;

pub fn build(
    command: &Command,
    entry: &FleetEntry,
    snapshot: Option<&DeviceSnapshot>,
    now: DateTime<Local>,
) -> Result<StatusUpdate, CoreError> {
    let function = snapshot
        .and_then(|s| s.function)
        .unwrap_or(ThermalFunction::Heating);
    let program = snapshot
        .and_then(|s| s.program.as_ref())
        .map_or_else(|| entry.default_program(), |p| p.number);

    let update = match command {
        Command::SetTemperature { target, hold, .. } => {
            validate_target(*target)?;
            manual(function, *target, hold, now)?
        }
        Command::SetBoost { duration, .. } => {
            let end = now
                .checked_add_signed(TimeDelta::minutes(i64::from(duration.minutes())))
                .ok_or_else(|| CoreError::ValidationFailed {
                    message: format!("boost end is out of range from {now}"),
                })?;
            let set_point = match function {
                ThermalFunction::Heating => MAX_TARGET,
                ThermalFunction::Cooling => MIN_TARGET,
            };
            StatusUpdate {
                function: function.as_wire().into(),
                mode: "boost".into(),
                set_point: Some(SetPoint::celsius(set_point)),
                programs: Vec::new(),
                activation_time: Some(format!("{}/{}", format_local(now), format_local(end))),
            }
        }
        Command::CancelBoost { .. } => automatic(function, program),
        Command::SetProgram { program, .. } => {
            if *program == 0 {
                return Err(CoreError::ValidationFailed {
                    message: "program numbers start at 1".into(),
                });
            }
            automatic(function, *program)
        }
        Command::TurnOff { hold, .. } => StatusUpdate {
            function: function.as_wire().into(),
            mode: "off".into(),
            set_point: None,
            programs: Vec::new(),
            activation_time: hold.end(now)?.map(format_local),
        },
        Command::SetMode { mode, .. } => match mode {
            ClimateMode::Auto => automatic(function, program),
            ClimateMode::Heat | ClimateMode::Cool => {
                let function = if *mode == ClimateMode::Heat {
                    ThermalFunction::Heating
                } else {
                    ThermalFunction::Cooling
                };
                let target = snapshot
                    .and_then(|s| s.target_temperature)
                    .unwrap_or(FALLBACK_TARGET)
                    .clamp(MIN_TARGET, MAX_TARGET);
                manual(function, target, &Hold::Indefinitely, now)?
            }
            ClimateMode::Off => StatusUpdate {
                function: function.as_wire().into(),
                mode: "off".into(),
                set_point: None,
                programs: Vec::new(),
                activation_time: None,
            },
        },
    };
    Ok(update)
}

fn validate_target(target: f64) -> Result<(), CoreError> {
    if (MIN_TARGET..=MAX_TARGET).contains(&target) {
        Ok(())
    } else {
        Err(CoreError::ValidationFailed {
            message: format!("target {target}°C outside {MIN_TARGET}..={MAX_TARGET}"),
        })
    }
}

fn manual(
    function: ThermalFunction,
    target: f64,
    hold: &Hold,
    now: DateTime<Local>,
) -> Result<StatusUpdate, CoreError> {
    Ok(StatusUpdate {
        function: function.as_wire().into(),
        mode: "manual".into(),
        set_point: Some(SetPoint::celsius(target)),
        programs: Vec::new(),
        activation_time: hold.end(now)?.map(format_local),
    })
}

fn automatic(function: ThermalFunction, program: u32) -> StatusUpdate {
    StatusUpdate {
        function: function.as_wire().into(),
        mode: "automatic".into(),
        set_point: None,
        programs: vec![ProgramNumber { number: program }],
        activation_time: None,
    }
}
