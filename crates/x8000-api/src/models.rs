// ── Wire types ──
//
// Shapes returned (and accepted) by the Smarther v2.0 API. Numeric
// fields arrive as numbers or numeric strings depending on firmware,
// so they go through `lenient`. Required-field checks live on the
// response wrappers, not in serde, so a missing field becomes a
// `MalformedResponse` with the raw body attached.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

// ── Lenient scalars ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Text(String),
}

/// Accept `T`, a string that parses as `T`, an empty string, or null.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Option::<Lenient<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Lenient::Value(v)) => Ok(Some(v)),
        Some(Lenient::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Lenient::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

// ── Chronothermostat status ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    #[serde(default, deserialize_with = "lenient")]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub time_stamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Sensor {
    #[serde(default)]
    pub measures: Vec<Measure>,
}

impl Sensor {
    /// First reported reading, if any.
    pub fn value(&self) -> Option<f64> {
        self.measures.first().and_then(|m| m.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgramRef {
    #[serde(default, deserialize_with = "lenient")]
    pub number: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlantRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub module: Option<ModuleRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SenderRef {
    #[serde(default)]
    pub plant: Option<PlantRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReceiverRef {
    #[serde(default)]
    pub oid: Option<String>,
}

/// One chronothermostat as reported by a status read or a push.
///
/// Every field is optional on the wire; a status read additionally
/// requires `function` and `mode` (see [`StatusResponse::into_primary`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chronothermostat {
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub set_point: Option<Measure>,
    #[serde(default)]
    pub programs: Vec<ProgramRef>,
    #[serde(default)]
    pub temperature_format: Option<String>,
    #[serde(default)]
    pub load_state: Option<String>,
    #[serde(default)]
    pub activation_time: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub thermometer: Option<Sensor>,
    #[serde(default)]
    pub hygrometer: Option<Sensor>,
    #[serde(default)]
    pub sender: Option<SenderRef>,
    #[serde(default)]
    pub receiver: Option<ReceiverRef>,
}

impl Chronothermostat {
    /// Module id carried by the payload itself.
    ///
    /// Prefers `sender.plant.module.id`, falling back to `receiver.oid`.
    pub fn module_id(&self) -> Option<&str> {
        self.sender
            .as_ref()
            .and_then(|s| s.plant.as_ref())
            .and_then(|p| p.module.as_ref())
            .and_then(|m| m.id.as_deref())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.receiver
                    .as_ref()
                    .and_then(|r| r.oid.as_deref())
                    .filter(|id| !id.is_empty())
            })
    }

    /// Plant id carried by the payload, if present.
    pub fn plant_id(&self) -> Option<&str> {
        self.sender
            .as_ref()
            .and_then(|s| s.plant.as_ref())
            .and_then(|p| p.id.as_deref())
    }

    /// First active program number.
    pub fn program_number(&self) -> Option<u32> {
        self.programs.first().and_then(|p| p.number)
    }
}

/// Body of a chronothermostat status read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub chronothermostats: Vec<Chronothermostat>,
}

impl StatusResponse {
    /// Extract the single status record, validating the fields every
    /// status read must carry.
    pub fn into_primary(self) -> Result<Chronothermostat, String> {
        let chrono = self
            .chronothermostats
            .into_iter()
            .next()
            .ok_or("empty `chronothermostats` list")?;
        if chrono.function.as_deref().is_none_or(str::is_empty) {
            return Err("missing field `function`".into());
        }
        if chrono.mode.as_deref().is_none_or(str::is_empty) {
            return Err("missing field `mode`".into());
        }
        Ok(chrono)
    }
}

// ── Status write ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetPoint {
    pub value: f64,
    pub unit: &'static str,
}

impl SetPoint {
    pub fn celsius(value: f64) -> Self {
        Self { value, unit: "C" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgramNumber {
    pub number: u32,
}

/// Body of a chronothermostat status write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub function: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_point: Option<SetPoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub programs: Vec<ProgramNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_time: Option<String>,
}

// ── Plants & topology ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Plant {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlantsResponse {
    #[serde(default)]
    pub plants: Vec<Plant>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TopologyModule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device: String,
}

impl TopologyModule {
    pub fn is_chronothermostat(&self) -> bool {
        self.device.eq_ignore_ascii_case("chronothermostat")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyPlant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<TopologyModule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyResponse {
    pub plant: TopologyPlant,
}

// ── Programs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Program {
    pub number: u32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramListEntry {
    #[serde(default)]
    pub programs: Vec<Program>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramListResponse {
    #[serde(default)]
    pub chronothermostats: Vec<ProgramListEntry>,
}

// ── C2C subscriptions ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Subscription {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "plantId", default)]
    pub plant_id: String,
    #[serde(rename = "EndPointUrl", default)]
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    #[serde(rename = "EndPointUrl")]
    pub endpoint_url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResponse {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
}
