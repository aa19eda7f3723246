//! Configuration file management
//!
//! CLIConfiguration with TOML parsing for ~/.coach/config.toml
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "https://coach.example.com"  # Backend base URL
//! api_key = "public-anon-key"        # Public API key sent with every request
//!
//! [auth]
//! access_token = "user-access-token"
//!
//! [realtime]
//! coalesce_delay_ms = 150        # Collapse rapid target changes
//! max_retries = 3                # Retry ceiling per target
//! join_timeout_secs = 10         # Channel join acknowledgement timeout
//! connection_timeout_secs = 10   # WebSocket connect timeout
//! heartbeat_interval_secs = 25   # 0 disables heartbeats
//!
//! [logging]
//! level = "info"                 # error, warn, info, debug, trace
//! format = "compact"             # compact, json
//! ```

use coach_link::{CoachLinkTimeouts, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CLIError, Result};

/// CLI configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CLIConfiguration {
    /// Backend connection settings
    pub server: Option<ServerConfig>,

    /// Authentication settings
    pub auth: Option<AuthConfig>,

    /// Subscription tuning
    pub realtime: Option<RealtimeConfig>,

    /// Log output
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL (e.g., https://coach.example.com)
    pub url: Option<String>,

    /// Public API key
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Access token of the signed-in user
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_coalesce_delay_ms")]
    pub coalesce_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Interval between heartbeats (0 = disabled)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_coalesce_delay_ms() -> u64 {
    150
}

fn default_max_retries() -> u32 {
    3
}

fn default_join_timeout_secs() -> u64 {
    10
}

fn default_connection_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    25
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            coalesce_delay_ms: default_coalesce_delay_ms(),
            max_retries: default_max_retries(),
            join_timeout_secs: default_join_timeout_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

pub fn expand_config_path(path: &Path) -> PathBuf {
    let path_str = path.to_str().unwrap_or("~/.coach/config.toml");
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    }
    path.to_path_buf()
}

pub fn default_config_path() -> PathBuf {
    expand_config_path(Path::new("~/.coach/config.toml"))
}

impl CLIConfiguration {
    /// Load configuration from file
    ///
    /// Returns default configuration if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CLIError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;

        let config: CLIConfiguration = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let expanded_path = expand_config_path(path);
        let path = &expanded_path;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CLIError::ConfigurationError(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn resolved_server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn resolved_realtime(&self) -> RealtimeConfig {
        self.realtime.clone().unwrap_or_default()
    }

    pub fn resolved_logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn access_token(&self) -> Option<String> {
        self.auth.as_ref().and_then(|auth| auth.access_token.clone())
    }

    /// Build the retry policy from the `[realtime]` section.
    ///
    /// Only the ceiling is configurable; backoff delays keep the library
    /// defaults.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(self.resolved_realtime().max_retries)
    }

    /// Build timeouts from the `[realtime]` section.
    pub fn to_timeouts(&self) -> CoachLinkTimeouts {
        let realtime = self.resolved_realtime();
        CoachLinkTimeouts::builder()
            .coalesce_delay_ms(realtime.coalesce_delay_ms)
            .join_timeout_secs(realtime.join_timeout_secs)
            .connection_timeout_secs(realtime.connection_timeout_secs)
            .heartbeat_interval(Duration::from_secs(realtime.heartbeat_interval_secs))
            .build()
    }
}
