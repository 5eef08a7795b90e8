// ── C2C push payload parsing ──
//
// The cloud delivers status changes to a registered endpoint. Bodies
// come in several nestings:
//
//   [{ "data": { "chronothermostats": [...] } }, ...]
//   { "data": { "chronothermostats": [...] } }
//   { "chronothermostats": [...] }
//
// and `chronothermostats` may be a single object instead of a list.
// Items that fail to parse, or carry no module id, are skipped
// individually; only a body with no recognizable structure is an error.

use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::models::Chronothermostat;

/// Attribution for push parsing failures.
pub const PUSH_SOURCE: &str = "push";

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(one) => vec![one],
        }
    }
}

#[derive(Deserialize)]
struct DataSection {
    chronothermostats: Option<OneOrMany<serde_json::Value>>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<DataSection>,
    #[serde(default)]
    chronothermostats: Option<OneOrMany<serde_json::Value>>,
}

impl Envelope {
    fn into_items(self) -> Option<Vec<serde_json::Value>> {
        self.data
            .and_then(|d| d.chronothermostats)
            .or(self.chronothermostats)
            .map(OneOrMany::into_vec)
    }
}

/// A parsed push item with its module id already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PushItem {
    pub module_id: String,
    pub status: Chronothermostat,
}

/// Parse a raw push body into per-module status items.
pub fn parse_push(raw: &[u8]) -> Result<Vec<PushItem>, Error> {
    let malformed = |message: String| Error::MalformedResponse {
        source_id: PUSH_SOURCE.into(),
        message,
        body: String::from_utf8_lossy(raw).into_owned(),
    };

    let envelopes: OneOrMany<Envelope> =
        serde_json::from_slice(raw).map_err(|e| malformed(e.to_string()))?;

    let mut found_any = false;
    let mut items = Vec::new();

    for envelope in envelopes.into_vec() {
        let Some(values) = envelope.into_items() else {
            continue;
        };
        found_any = true;

        for value in values {
            let status: Chronothermostat = match serde_json::from_value(value) {
                Ok(status) => status,
                Err(e) => {
                    debug!(error = %e, "skipping unparseable push item");
                    continue;
                }
            };
            let Some(module_id) = status.module_id().map(str::to_owned) else {
                debug!("skipping push item without a module id");
                continue;
            };
            items.push(PushItem { module_id, status });
        }
    }

    if !found_any {
        return Err(malformed("no `chronothermostats` section".into()));
    }
    Ok(items)
}
