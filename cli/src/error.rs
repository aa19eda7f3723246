//! Error types for coach-cli
//!
//! Provides user-friendly error messages for the failures a terminal user can
//! act on: bad configuration, unreadable files, and client setup errors.

use coach_link::CoachLinkError;
use std::fmt;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CLIError>;

/// Errors that can occur in the CLI
#[derive(Debug)]
pub enum CLIError {
    /// Error from coach-link library
    LinkError(CoachLinkError),

    /// Configuration file error
    ConfigurationError(String),

    /// File I/O error
    FileError(String),

    /// Writing an event to the output failed
    OutputError(String),

    /// Logging could not be initialized
    LoggingError(String),
}

impl CLIError {
    fn format_link_error(err: &CoachLinkError) -> String {
        match err {
            CoachLinkError::NetworkError(msg) => Self::clean_nested_message(msg),
            CoachLinkError::ConfigurationError(msg) => format!("Invalid client settings: {}", msg),
            CoachLinkError::AuthenticationError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    fn clean_nested_message(message: &str) -> String {
        let mut cleaned = message.trim();
        let prefixes = ["Network error:", "network error:", "Connection failed:"];

        loop {
            let mut stripped = false;
            for prefix in &prefixes {
                if let Some(rest) = cleaned.strip_prefix(prefix) {
                    cleaned = rest.trim_start();
                    stripped = true;
                    break;
                }
            }

            if !stripped {
                break;
            }
        }

        cleaned.to_string()
    }
}

impl fmt::Display for CLIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CLIError::LinkError(e) => write!(f, "{}", Self::format_link_error(e)),
            CLIError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CLIError::FileError(msg) => write!(f, "File error: {}", msg),
            CLIError::OutputError(msg) => write!(f, "Output error: {}", msg),
            CLIError::LoggingError(msg) => write!(f, "Logging error: {}", msg),
        }
    }
}

impl std::error::Error for CLIError {}

impl From<CoachLinkError> for CLIError {
    fn from(err: CoachLinkError) -> Self {
        CLIError::LinkError(err)
    }
}

impl From<std::io::Error> for CLIError {
    fn from(err: std::io::Error) -> Self {
        CLIError::FileError(err.to_string())
    }
}

impl From<toml::de::Error> for CLIError {
    fn from(err: toml::de::Error) -> Self {
        CLIError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}

impl From<serde_json::Error> for CLIError {
    fn from(err: serde_json::Error) -> Self {
        CLIError::OutputError(err.to_string())
    }
}
