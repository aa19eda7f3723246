use serde::{Deserialize, Serialize};
use std::fmt;

/// Class of row change a channel listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    /// Every change type.
    #[serde(rename = "*")]
    All,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::All => "*",
        }
    }

    /// Whether an event of type `event_type` (as sent by the platform)
    /// belongs to this class.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            ChangeKind::All => true,
            kind => kind.as_str().eq_ignore_ascii_case(event_type),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event filter handed to the platform when registering a channel.
///
/// Serializes to the `postgres_changes` entry expected by the realtime
/// join payload: `{"event": "INSERT", "schema": "public", "table": "messages",
/// "filter": "conversation_id=eq.42"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
    /// Row filter in `column=eq.value` form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ChangeFilter {
    pub fn new(event: ChangeKind, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            event,
            schema: schema.into(),
            table: table.into(),
            filter: None,
        }
    }

    /// Restrict the filter to rows whose `column` equals `value`.
    pub fn with_equals(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value));
        self
    }
}
