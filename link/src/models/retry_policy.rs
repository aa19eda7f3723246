use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which failure path a retry is scheduled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePath {
    /// The platform reported `CHANNEL_ERROR` or `TIMED_OUT`.
    ChannelStatus,
    /// Registering the channel itself failed.
    SetupException,
}

/// Retry and backoff settings for subscription managers.
///
/// Backoff is linear and capped: `min(base * retry_count, cap)`, with a
/// separate (longer) pair of delays for setup failures.
///
/// # Example
///
/// ```rust
/// use coach_link::RetryPolicy;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_error_delays_ms(1_000, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry ceiling: after this many consecutive failures the subscription
    /// stays failed until its target changes or it is released. The count
    /// includes the failure of the initial attempt, so a ceiling of 3 allows
    /// two retries (three registrations in total).
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay after `CHANNEL_ERROR`/`TIMED_OUT`.
    /// Default: 5000ms
    #[serde(default = "default_error_base_delay_ms")]
    pub error_base_delay_ms: u64,

    /// Cap for the status-error backoff.
    /// Default: 30000ms
    #[serde(default = "default_error_max_delay_ms")]
    pub error_max_delay_ms: u64,

    /// Base delay after a setup exception.
    /// Default: 10000ms
    #[serde(default = "default_setup_base_delay_ms")]
    pub setup_base_delay_ms: u64,

    /// Cap for the setup-exception backoff.
    /// Default: 60000ms
    #[serde(default = "default_setup_max_delay_ms")]
    pub setup_max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_error_base_delay_ms() -> u64 {
    5000
}

fn default_error_max_delay_ms() -> u64 {
    30000
}

fn default_setup_base_delay_ms() -> u64 {
    10000
}

fn default_setup_max_delay_ms() -> u64 {
    60000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            error_base_delay_ms: default_error_base_delay_ms(),
            error_max_delay_ms: default_error_max_delay_ms(),
            setup_base_delay_ms: default_setup_base_delay_ms(),
            setup_max_delay_ms: default_setup_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_error_delays_ms(mut self, base: u64, cap: u64) -> Self {
        self.error_base_delay_ms = base;
        self.error_max_delay_ms = cap;
        self
    }

    pub fn with_setup_delays_ms(mut self, base: u64, cap: u64) -> Self {
        self.setup_base_delay_ms = base;
        self.setup_max_delay_ms = cap;
        self
    }

    /// Delay before retry number `retry_count` (1-based) on `path`.
    pub fn backoff(&self, path: FailurePath, retry_count: u32) -> Duration {
        let (base, cap) = match path {
            FailurePath::ChannelStatus => (self.error_base_delay_ms, self.error_max_delay_ms),
            FailurePath::SetupException => (self.setup_base_delay_ms, self.setup_max_delay_ms),
        };
        let delay = base.saturating_mul(u64::from(retry_count.max(1)));
        Duration::from_millis(delay.min(cap))
    }

    /// Whether a subscription that has failed `retry_count` times may retry.
    pub fn allows_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}
