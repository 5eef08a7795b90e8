// ── Smarther v2.0 endpoint catalogue ──
//
// Each variant knows its path, default method, and the identifier that
// failures are attributed to (module id, else plant id, else account).

use reqwest::Method;

const PREFIX: &str = "/smarther/v2.0";

/// Attribution used for account-level endpoints with no plant or module.
pub const ACCOUNT_SOURCE: &str = "account";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Plants,
    Topology {
        plant_id: String,
    },
    ChronothermostatStatus {
        plant_id: String,
        module_id: String,
    },
    SetChronothermostatStatus {
        plant_id: String,
        module_id: String,
    },
    ProgramList {
        plant_id: String,
        module_id: String,
    },
    Subscriptions,
    Subscribe {
        plant_id: String,
    },
    Unsubscribe {
        plant_id: String,
        subscription_id: String,
    },
}

impl Endpoint {
    /// HTTP method this endpoint is normally called with.
    pub fn method(&self) -> Method {
        match self {
            Self::SetChronothermostatStatus { .. } | Self::Subscribe { .. } => Method::POST,
            Self::Unsubscribe { .. } => Method::DELETE,
            Self::Plants
            | Self::Topology { .. }
            | Self::ChronothermostatStatus { .. }
            | Self::ProgramList { .. }
            | Self::Subscriptions => Method::GET,
        }
    }

    /// Path relative to the API base URL.
    pub fn path(&self) -> String {
        match self {
            Self::Plants => format!("{PREFIX}/plants"),
            Self::Topology { plant_id } => format!("{PREFIX}/plants/{plant_id}/topology"),
            Self::ChronothermostatStatus {
                plant_id,
                module_id,
            }
            | Self::SetChronothermostatStatus {
                plant_id,
                module_id,
            } => format!("{}/{module_id}", status_base(plant_id)),
            Self::ProgramList {
                plant_id,
                module_id,
            } => format!("{}/{module_id}/programlist", status_base(plant_id)),
            Self::Subscriptions => format!("{PREFIX}/subscription"),
            Self::Subscribe { plant_id } => format!("{PREFIX}/plants/{plant_id}/subscription"),
            Self::Unsubscribe {
                plant_id,
                subscription_id,
            } => format!("{PREFIX}/plants/{plant_id}/subscription/{subscription_id}"),
        }
    }

    /// Identifier that errors from this endpoint are reported against.
    pub fn source_id(&self) -> &str {
        match self {
            Self::ChronothermostatStatus { module_id, .. }
            | Self::SetChronothermostatStatus { module_id, .. }
            | Self::ProgramList { module_id, .. } => module_id,
            Self::Topology { plant_id }
            | Self::Subscribe { plant_id }
            | Self::Unsubscribe { plant_id, .. } => plant_id,
            Self::Plants | Self::Subscriptions => ACCOUNT_SOURCE,
        }
    }
}

fn status_base(plant_id: &str) -> String {
    format!(
        "{PREFIX}/chronothermostat/thermoregulation/addressLocation/plants/{plant_id}/modules/parameter/id/value"
    )
}
