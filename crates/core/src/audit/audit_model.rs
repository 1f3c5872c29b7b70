use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user-initiated mutation, recorded after it succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// Namespaced action kind, e.g. `journal:create`.
    pub kind: String,
    pub details: Value,
    pub owner_id: String,
    pub recorded_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(kind: impl Into<String>, owner_id: impl Into<String>, details: Value) -> Self {
        Self {
            kind: kind.into(),
            details,
            owner_id: owner_id.into(),
            recorded_at: Utc::now(),
        }
    }
}
