//! Timeout configuration for coach-link.
//!
//! Centralizes the delays used by the subscription managers (coalescing of
//! rapid target changes, session lookups) and by the WebSocket realtime
//! adapter (connect, join acknowledgement, heartbeats).

use std::time::Duration;

/// Timeout configuration for realtime operations.
///
/// # Examples
///
/// ```rust
/// use coach_link::CoachLinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults (recommended)
/// let timeouts = CoachLinkTimeouts::default();
///
/// // Slower coalescing for jumpy navigation
/// let timeouts = CoachLinkTimeouts::builder()
///     .coalesce_delay(Duration::from_millis(200))
///     .join_timeout_secs(15)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachLinkTimeouts {
    /// Delay between a target change and the start of channel setup. Rapid
    /// consecutive `observe` calls inside this window collapse into a
    /// single setup attempt.
    /// Default: 150ms
    pub coalesce_delay: Duration,

    /// Maximum time to wait for the session provider.
    /// Default: 10 seconds
    pub session_timeout: Duration,

    /// Timeout for establishing the realtime WebSocket (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Time the platform has to acknowledge a channel join before the
    /// adapter reports `TIMED_OUT`.
    /// Default: 10 seconds
    pub join_timeout: Duration,

    /// Interval between heartbeat frames on the shared socket.
    /// Set to 0 to disable heartbeats.
    /// Default: 25 seconds
    pub heartbeat_interval: Duration,

    /// Maximum wait for a heartbeat reply before the socket is treated as
    /// dead. Set to 0 to disable the check.
    /// Default: 10 seconds
    pub heartbeat_timeout: Duration,
}

impl Default for CoachLinkTimeouts {
    fn default() -> Self {
        Self {
            coalesce_delay: Duration::from_millis(150),
            session_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(10),
        }
    }
}

impl CoachLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> CoachLinkTimeoutsBuilder {
        CoachLinkTimeoutsBuilder::new()
    }

    /// Short timeouts for a backend running on localhost.
    pub fn fast() -> Self {
        Self {
            coalesce_delay: Duration::from_millis(150),
            session_timeout: Duration::from_secs(2),
            connection_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(3),
        }
    }

    /// Timeouts for tests: no coalescing delay beyond a few milliseconds and
    /// heartbeats disabled so paused-clock tests stay deterministic.
    pub fn for_testing() -> Self {
        Self {
            coalesce_delay: Duration::from_millis(10),
            session_timeout: Duration::from_secs(1),
            connection_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::ZERO,
            heartbeat_timeout: Duration::ZERO,
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for [`CoachLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct CoachLinkTimeoutsBuilder {
    timeouts: CoachLinkTimeouts,
}

impl CoachLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: CoachLinkTimeouts::default(),
        }
    }

    /// Set the coalescing delay applied after a target change.
    pub fn coalesce_delay(mut self, delay: Duration) -> Self {
        self.timeouts.coalesce_delay = delay;
        self
    }

    /// Set the coalescing delay in milliseconds.
    pub fn coalesce_delay_ms(self, ms: u64) -> Self {
        self.coalesce_delay(Duration::from_millis(ms))
    }

    /// Set the session lookup timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.session_timeout = timeout;
        self
    }

    /// Set the WebSocket connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the WebSocket connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the channel join acknowledgement timeout.
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.join_timeout = timeout;
        self
    }

    /// Set the channel join acknowledgement timeout in seconds.
    pub fn join_timeout_secs(self, secs: u64) -> Self {
        self.join_timeout(Duration::from_secs(secs))
    }

    /// Set the heartbeat interval. Zero disables heartbeats.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_interval = interval;
        self
    }

    /// Set the heartbeat reply timeout. Zero disables the check.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.heartbeat_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> CoachLinkTimeouts {
        self.timeouts
    }
}
