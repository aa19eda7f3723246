use serde::{Deserialize, Serialize};
use std::fmt;

/// Status transitions reported by the platform for a registered channel.
///
/// The "connecting" phase is implicit: it lasts from registration until the
/// first status arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    Closed,
    ChannelError,
    TimedOut,
}

impl ChannelStatus {
    /// `CHANNEL_ERROR` and `TIMED_OUT` are retried; `CLOSED` is a deliberate
    /// teardown and is not.
    pub fn is_failure(&self) -> bool {
        matches!(self, ChannelStatus::ChannelError | ChannelStatus::TimedOut)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelStatus::Subscribed => "SUBSCRIBED",
            ChannelStatus::Closed => "CLOSED",
            ChannelStatus::ChannelError => "CHANNEL_ERROR",
            ChannelStatus::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}
