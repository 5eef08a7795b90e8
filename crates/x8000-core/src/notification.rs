// ── Account-level notifications ──
//
// Emitted on a broadcast channel when the coordinator enters or leaves
// cooldown. One notification per abort, never one per device.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    RateLimitExceeded,
    AuthFailed,
    CooldownCleared,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Device (or `account`/`oauth`) whose call triggered the event.
    pub source_id: String,
    pub error_message: String,
    pub cooldown_minutes: u64,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        source_id: impl Into<String>,
        error_message: impl Into<String>,
        cooldown_minutes: u64,
    ) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            error_message: error_message.into(),
            cooldown_minutes,
            emitted_at: Utc::now(),
        }
    }
}
