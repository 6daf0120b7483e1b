use serde::{Deserialize, Serialize};

use super::Region;

/// Store-assigned identifier of a persisted event
pub type EventId = String;

/// Candidate "app opened from this IP" event, not yet persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOpenEvent {
    pub channel_id: String,
    pub app_name: String,
    pub ip: String,
    pub region: Region,
    /// Referring domain without scheme or path
    pub origin: String,
    pub is_country_china: bool,
    pub is_china_inland: bool,
    /// Unix timestamp (seconds)
    pub created_at: i64,
}

/// Persisted open event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenEvent {
    pub id: EventId,
    #[serde(flatten)]
    pub event: NewOpenEvent,
}
