//! Shared helpers for command handlers.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use x8000_core::{DeviceSnapshot, Hold, PlantId};

use crate::cli::HoldArgs;
use crate::config::Session;
use crate::error::CliError;

/// Accepted `--until` format.
pub const UNTIL_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Translate `--for` / `--until` into a hold.
pub fn parse_hold(args: &HoldArgs) -> Result<Hold, CliError> {
    if let Some(ref raw) = args.hold_for {
        let duration = humantime::parse_duration(raw).map_err(|e| CliError::Validation {
            field: "--for".into(),
            reason: e.to_string(),
        })?;
        return Ok(Hold::For(duration));
    }
    if let Some(ref raw) = args.until {
        return parse_until(raw).map(Hold::Until);
    }
    Ok(Hold::Indefinitely)
}

fn parse_until(raw: &str) -> Result<DateTime<Local>, CliError> {
    let invalid = |reason: String| CliError::Validation {
        field: "--until".into(),
        reason,
    };
    let naive = NaiveDateTime::parse_from_str(raw, UNTIL_FORMAT)
        .map_err(|e| invalid(format!("expected \"YYYY-MM-DD HH:MM\": {e}")))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| invalid(format!("{raw} is ambiguous or skipped in local time")))
}

/// Plants to act on: the one given, else every plant in the profile.
pub fn target_plants(session: &Session, plant: Option<String>) -> Result<Vec<PlantId>, CliError> {
    if let Some(plant) = plant {
        return Ok(vec![PlantId::new(plant)]);
    }
    let mut plants: Vec<PlantId> = Vec::new();
    for t in &session.profile().thermostats {
        let id = PlantId::new(t.plant_id.as_str());
        if !plants.contains(&id) {
            plants.push(id);
        }
    }
    if plants.is_empty() {
        return Err(CliError::Validation {
            field: "--plant".into(),
            reason: "no thermostats configured; pass --plant or run x8000 discover --save".into(),
        });
    }
    Ok(plants)
}

/// One-line summary of a snapshot, used by the event log.
pub fn summarize(snap: &DeviceSnapshot, now: DateTime<Utc>) -> String {
    if !snap.available {
        return format!("{}: unavailable", snap.name);
    }
    let mut line = format!("{}:", snap.name);
    if let Some(t) = snap.current_temperature {
        line.push_str(&format!(" {t:.1}°C"));
    }
    if let Some(h) = snap.current_humidity {
        line.push_str(&format!(" {h:.0}%"));
    }
    if let Some(mode) = snap.mode {
        line.push_str(&format!(" {mode}"));
    }
    if let Some(target) = snap.target_temperature {
        line.push_str(&format!(" -> {target:.1}°C"));
    }
    if let Some(left) = snap.boost_remaining(now) {
        line.push_str(&format!(" (boost {} min left)", left.as_secs() / 60));
    }
    line
}
