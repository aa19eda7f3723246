use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoachLinkError, Result};

/// Identifier of the thing a subscription watches (e.g. a conversation id).
///
/// Opaque to the client; the only requirement is that it is non-empty once
/// trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    /// Validate and wrap a target id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoachLinkError::ConfigurationError(
                "Target id must not be empty".to_string(),
            ));
        }
        if trimmed.len() != id.len() {
            return Ok(Self(trimmed.to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Target {
    type Error = CoachLinkError;

    fn try_from(value: String) -> Result<Self> {
        Target::new(value)
    }
}

impl TryFrom<&str> for Target {
    type Error = CoachLinkError;

    fn try_from(value: &str) -> Result<Self> {
        Target::new(value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
