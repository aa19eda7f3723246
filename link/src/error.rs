//! Error types for coach-link.
//!
//! Failures inside a [`RealtimeSubscriptionManager`](crate::RealtimeSubscriptionManager)
//! never reach the caller of `observe`/`release`; they are classified here so
//! the manager can decide between retrying and giving up, and so the
//! diagnostic hooks in [`EventHandlers`](crate::EventHandlers) carry a typed
//! reason.

use thiserror::Error;

/// Result type for coach-link operations
pub type Result<T> = std::result::Result<T, CoachLinkError>;

/// Errors that can occur while talking to the realtime backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoachLinkError {
    /// No authenticated session is available; subscription setup is skipped.
    #[error("No authenticated session")]
    NoSession,

    /// Registering the channel with the platform failed before any status
    /// was reported (the "setup exception" path).
    #[error("Channel setup failed: {0}")]
    SetupError(String),

    /// The platform reported `CHANNEL_ERROR` for a channel.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The platform reported `TIMED_OUT` for a channel.
    #[error("Timed out: {0}")]
    TimedOut(String),

    /// Retries for the current target are exhausted.
    #[error("Retry ceiling exceeded after {attempts} failed attempt(s)")]
    RetryCeilingExceeded { attempts: u32 },

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CoachLinkError {
    /// Whether an automatic retry may succeed after this error.
    ///
    /// `NoSession` is not recoverable by retrying: the precondition gate is
    /// re-evaluated on the next `observe` instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoachLinkError::SetupError(_)
                | CoachLinkError::ChannelError(_)
                | CoachLinkError::TimedOut(_)
                | CoachLinkError::WebSocketError(_)
                | CoachLinkError::NetworkError(_)
        )
    }
}

impl From<serde_json::Error> for CoachLinkError {
    fn from(err: serde_json::Error) -> Self {
        CoachLinkError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for CoachLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CoachLinkError::TimedOut(err.to_string())
        } else {
            CoachLinkError::NetworkError(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CoachLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CoachLinkError::WebSocketError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(CoachLinkError::NoSession.to_string(), "No authenticated session");
        assert_eq!(
            CoachLinkError::RetryCeilingExceeded { attempts: 3 }.to_string(),
            "Retry ceiling exceeded after 3 failed attempt(s)"
        );
        assert_eq!(
            CoachLinkError::ChannelError("boom".into()).to_string(),
            "Channel error: boom"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(CoachLinkError::SetupError("x".into()).is_recoverable());
        assert!(CoachLinkError::ChannelError("x".into()).is_recoverable());
        assert!(CoachLinkError::TimedOut("x".into()).is_recoverable());
        assert!(!CoachLinkError::NoSession.is_recoverable());
        assert!(!CoachLinkError::RetryCeilingExceeded { attempts: 3 }.is_recoverable());
        assert!(!CoachLinkError::ConfigurationError("x".into()).is_recoverable());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: CoachLinkError = err.into();
        assert!(matches!(converted, CoachLinkError::SerializationError(_)));
    }
}
