use serde::{Deserialize, Serialize};

/// Result of the session precondition check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Access token forwarded to the realtime join, when the platform needs it.
    #[serde(skip_serializing, default)]
    pub access_token: Option<String>,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            valid: true,
            user_id: Some(user_id.into()),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// No session: subscriptions are skipped.
    pub fn none() -> Self {
        Self {
            valid: false,
            user_id: None,
            access_token: None,
        }
    }

    /// The user id when the session is usable; `None` otherwise.
    pub fn user(&self) -> Option<&str> {
        if !self.valid {
            return None;
        }
        self.user_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}
