// ── Device snapshot ──
//
// Last known state of one thermostat. Owned by the DataStore and only
// ever replaced wholesale through `merged`, never mutated in place by
// readers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::fleet::FleetEntry;
use super::id::{DeviceId, PlantId};

/// Seconds added before rounding the boost countdown to whole minutes,
/// so a countdown read just after a minute boundary does not lose a minute.
const BOOST_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OperatingMode {
    Automatic,
    Manual,
    Boost,
    Off,
    Protection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ThermalFunction {
    Heating,
    Cooling,
}

impl ThermalFunction {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Heating => "heating",
            Self::Cooling => "cooling",
        }
    }
}

/// Whether the boiler/cooler relay is currently engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LoadState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveProgram {
    pub number: u32,
    /// Name from the configured program list, when known.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub plant_id: PlantId,
    pub name: String,
    pub current_temperature: Option<f64>,
    pub current_humidity: Option<f64>,
    pub target_temperature: Option<f64>,
    pub mode: Option<OperatingMode>,
    pub function: Option<ThermalFunction>,
    pub load_state: Option<LoadState>,
    pub program: Option<ActiveProgram>,
    /// End of the running boost. Only meaningful while `mode` is `Boost`.
    pub boost_until: Option<DateTime<Utc>>,
    pub available: bool,
    /// When any field last changed.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Fields observed by one poll or push. `None` means "not reported".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotUpdate {
    pub current_temperature: Option<f64>,
    pub current_humidity: Option<f64>,
    pub target_temperature: Option<f64>,
    pub mode: Option<OperatingMode>,
    pub function: Option<ThermalFunction>,
    pub load_state: Option<LoadState>,
    pub program: Option<ActiveProgram>,
    pub boost_until: Option<DateTime<Utc>>,
}

impl DeviceSnapshot {
    /// Startup state: no data, unavailable.
    pub fn empty(entry: &FleetEntry) -> Self {
        Self {
            id: entry.id.clone(),
            plant_id: entry.plant_id.clone(),
            name: entry.name.clone(),
            current_temperature: None,
            current_humidity: None,
            target_temperature: None,
            mode: None,
            function: None,
            load_state: None,
            program: None,
            boost_until: None,
            available: false,
            last_updated: None,
        }
    }

    /// Remaining boost time in whole minutes, `None` outside boost.
    pub fn boost_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.mode != Some(OperatingMode::Boost) {
            return None;
        }
        let until = self.boost_until?;
        let secs = (until - now).num_seconds() + BOOST_SKEW_SECS;
        let minutes = u64::try_from(secs / 60).unwrap_or(0);
        Some(Duration::from_secs(minutes * 60))
    }

    /// Apply `update` on top of this snapshot and mark it available.
    ///
    /// `last_updated` is left untouched; the store decides whether the
    /// result differs from the current value.
    pub(crate) fn merged(&self, update: &SnapshotUpdate) -> Self {
        let mut next = self.clone();
        next.available = true;

        if let Some(v) = update.current_temperature {
            next.current_temperature = Some(v);
        }
        if let Some(v) = update.current_humidity {
            next.current_humidity = Some(v);
        }
        if let Some(v) = update.target_temperature {
            next.target_temperature = Some(v);
        }
        if let Some(v) = update.function {
            next.function = Some(v);
        }
        if let Some(v) = update.load_state {
            next.load_state = Some(v);
        }
        if let Some(v) = &update.program {
            next.program = Some(v.clone());
        }
        if let Some(mode) = update.mode {
            next.mode = Some(mode);
            if mode != OperatingMode::Boost {
                next.boost_until = None;
            }
        }
        if next.mode == Some(OperatingMode::Boost) && update.boost_until.is_some() {
            next.boost_until = update.boost_until;
        }
        next
    }

    /// Same data ignoring `last_updated`.
    pub(crate) fn same_state(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.last_updated = other.last_updated;
        a == *other
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot::empty(&FleetEntry::new("d1", "p1", "Sala"))
    }

    #[test]
    fn merge_overwrites_only_reported_fields() {
        let base = snapshot().merged(&SnapshotUpdate {
            current_temperature: Some(20.0),
            current_humidity: Some(40.0),
            ..SnapshotUpdate::default()
        });
        let next = base.merged(&SnapshotUpdate {
            current_temperature: Some(21.0),
            ..SnapshotUpdate::default()
        });
        assert_eq!(next.current_temperature, Some(21.0));
        assert_eq!(next.current_humidity, Some(40.0));
        assert!(next.available);
    }

    #[test]
    fn leaving_boost_clears_end_time() {
        let until = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let boosting = snapshot().merged(&SnapshotUpdate {
            mode: Some(OperatingMode::Boost),
            boost_until: Some(until),
            ..SnapshotUpdate::default()
        });
        assert_eq!(boosting.boost_until, Some(until));

        let auto = boosting.merged(&SnapshotUpdate {
            mode: Some(OperatingMode::Automatic),
            ..SnapshotUpdate::default()
        });
        assert_eq!(auto.boost_until, None);
    }

    #[test]
    fn boost_remaining_rounds_with_skew() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap();
        let mut snap = snapshot();
        snap.mode = Some(OperatingMode::Boost);
        snap.boost_until = Some(now + chrono::TimeDelta::seconds(29 * 60 + 45));
        assert_eq!(snap.boost_remaining(now), Some(Duration::from_secs(30 * 60)));

        snap.boost_until = Some(now - chrono::TimeDelta::minutes(5));
        assert_eq!(snap.boost_remaining(now), Some(Duration::ZERO));

        snap.mode = Some(OperatingMode::Manual);
        assert_eq!(snap.boost_remaining(now), None);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("AUTOMATIC".parse::<OperatingMode>().unwrap(), OperatingMode::Automatic);
        assert_eq!(OperatingMode::Boost.to_string(), "boost");
        assert!("turbo".parse::<OperatingMode>().is_err());
    }

    #[test]
    fn same_state_ignores_timestamp() {
        let mut a = snapshot();
        let mut b = snapshot();
        a.last_updated = Some(Utc::now());
        assert!(a.same_state(&b));
        b.available = true;
        assert!(!a.same_state(&b));
    }
}
