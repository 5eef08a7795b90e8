// ── Wire → domain conversion ──
//
// Turns a `Chronothermostat` (from a status read or a push item) into a
// `SnapshotUpdate`. Unknown enumeration values are errors; absent
// fields simply stay `None`.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use x8000_api::models::{Chronothermostat, Sensor};

use crate::model::{
    ActiveProgram, FleetEntry, LoadState, OperatingMode, SnapshotUpdate, ThermalFunction,
};

/// Naive timestamp layout used by the thermostat, in local time.
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Convert one status record for `entry`.
pub fn to_update(
    status: &Chronothermostat,
    entry: &FleetEntry,
) -> Result<SnapshotUpdate, String> {
    let mode = status
        .mode
        .as_deref()
        .map(|m| {
            m.parse::<OperatingMode>()
                .map_err(|_| format!("unknown mode `{m}`"))
        })
        .transpose()?;
    let function = status
        .function
        .as_deref()
        .map(|f| {
            f.parse::<ThermalFunction>()
                .map_err(|_| format!("unknown function `{f}`"))
        })
        .transpose()?;
    let load_state = status
        .load_state
        .as_deref()
        .and_then(|s| s.parse::<LoadState>().ok());

    let program = status.program_number().map(|number| ActiveProgram {
        number,
        name: entry.program_name(number).map(str::to_owned),
    });

    let boost_until = if mode == Some(OperatingMode::Boost) {
        status.activation_time.as_deref().and_then(activation_end)
    } else {
        None
    };

    Ok(SnapshotUpdate {
        current_temperature: status.thermometer.as_ref().and_then(Sensor::value),
        current_humidity: status.hygrometer.as_ref().and_then(Sensor::value),
        target_temperature: status.set_point.as_ref().and_then(|s| s.value),
        mode,
        function,
        load_state,
        program,
        boost_until,
    })
}

/// End instant of an `activationTime` value (`start/end` or `end`).
///
/// Accepts RFC 3339 or a naive timestamp interpreted as local time.
pub fn activation_end(raw: &str) -> Option<DateTime<Utc>> {
    let end = raw.rsplit('/').next()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(end) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(end, LOCAL_TIME_FORMAT) {
        Ok(naive) => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
        Err(e) => {
            debug!(value = raw, error = %e, "unparseable activationTime");
            None
        }
    }
}

/// Format a local instant the way the thermostat expects it.
pub fn format_local(dt: DateTime<Local>) -> String {
    dt.format(LOCAL_TIME_FORMAT).to_string()
}
