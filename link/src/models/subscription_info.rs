//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] is a read-only snapshot of a manager's current
//! subscription, useful for debugging, tests and status displays.

use serde::{Deserialize, Serialize};

use super::subscription_state::SubscriptionState;

/// Read-only snapshot of a subscription's lifecycle fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Purpose name (`messages`, `notifications`, ...).
    pub purpose: String,
    /// Identifier of the subscription object, carried by its handle.
    pub lease: u64,
    pub target: String,
    pub state: SubscriptionState,
    pub retry_count: u32,
    /// Generation token of the current attempt.
    pub generation: u64,
    /// Channel name of the current attempt, once setup has started.
    pub channel_name: Option<String>,
    /// Whether a retry timer is pending.
    pub retry_scheduled: bool,
    /// Millis since Unix epoch when the subscription was created.
    pub created_at_ms: u64,
    /// Millis since Unix epoch of the last delivered change event.
    pub last_event_time_ms: Option<u64>,
    /// Last failure reason, cleared on success.
    pub last_error: Option<String>,
}
