use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A row change delivered on an active channel.
///
/// Consumers treat this as "something changed for the target" and re-fetch
/// authoritative state; the payload is passed through for convenience only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Change type as reported by the platform (`INSERT`, `UPDATE`, `DELETE`).
    #[serde(rename = "type", alias = "eventType")]
    pub event_type: String,
    pub schema: String,
    pub table: String,
    /// New row values, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<JsonValue>,
    /// Previous row values for updates and deletes, if the table exposes them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub fn new(event_type: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            schema: schema.into(),
            table: table.into(),
            record: None,
            old_record: None,
            commit_timestamp: None,
        }
    }

    pub fn with_record(mut self, record: JsonValue) -> Self {
        self.record = Some(record);
        self
    }

    /// Look up a column in the new record, falling back to the old one.
    pub fn column(&self, name: &str) -> Option<&JsonValue> {
        self.record
            .as_ref()
            .and_then(|r| r.get(name))
            .or_else(|| self.old_record.as_ref().and_then(|r| r.get(name)))
    }
}
