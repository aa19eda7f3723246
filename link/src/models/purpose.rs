use serde::{Deserialize, Serialize};
use std::fmt;

use super::change_filter::{ChangeFilter, ChangeKind};
use super::target::Target;

/// The logical stream a manager serves.
///
/// Purposes are independent: a messages subscription and a notifications
/// subscription for the same conversation each run their own lifecycle.
///
/// # Example
///
/// ```rust
/// use coach_link::{ChangeKind, Purpose};
///
/// let messages = Purpose::messages();
/// assert_eq!(messages.table, "messages");
///
/// let custom = Purpose::new("sessions", "public", "coaching_sessions", "mentee_id")
///     .with_event(ChangeKind::Update);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purpose {
    /// Short name used in channel names and log lines.
    pub name: String,
    pub schema: String,
    pub table: String,
    /// Column compared against the target id.
    pub filter_column: String,
    pub event: ChangeKind,
}

impl Purpose {
    pub fn new(
        name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        filter_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            table: table.into(),
            filter_column: filter_column.into(),
            event: ChangeKind::All,
        }
    }

    /// New messages in a conversation.
    pub fn messages() -> Self {
        Self::new("messages", "public", "messages", "conversation_id").with_event(ChangeKind::Insert)
    }

    /// Notifications attached to a conversation (created, read, dismissed).
    pub fn notifications() -> Self {
        Self::new("notifications", "public", "notifications", "conversation_id")
    }

    pub fn with_event(mut self, event: ChangeKind) -> Self {
        self.event = event;
        self
    }

    /// Platform filter scoped to `target`.
    pub fn filter_for(&self, target: &Target) -> ChangeFilter {
        ChangeFilter::new(self.event, self.schema.clone(), self.table.clone())
            .with_equals(&self.filter_column, target.as_str())
    }

    /// Unique channel name for one subscription attempt.
    ///
    /// Includes the target, the user and a nonce so a fresh attempt never
    /// collides with a registration the server still remembers.
    pub fn channel_name(&self, target: &Target, user_id: &str, nonce: &str) -> String {
        format!("{}:{}:{}:{}", self.name, target, user_id, nonce)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
