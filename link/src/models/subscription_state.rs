use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Nothing observed yet.
    Idle,
    /// Waiting for the coalescing delay, the platform registration or its
    /// first status.
    Connecting,
    /// Subscribed; change events are delivered.
    Active,
    /// Released, replaced or closed by the platform. Terminal.
    Closed,
    /// Last attempt failed. Either a retry is scheduled or the retry ceiling
    /// was reached. A later `SUBSCRIBED` on the same registration recovers
    /// it to `Active`.
    Failed,
}

impl SubscriptionState {
    /// Allowed transitions of the lifecycle state machine.
    pub fn can_transition_to(&self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Active)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Active, Failed)
                | (Active, Closed)
                | (Failed, Connecting)
                | (Failed, Active)
                | (Failed, Closed)
        )
    }

    /// A subscription in one of these states absorbs repeated `observe`
    /// calls for the same target.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Connecting | SubscriptionState::Active | SubscriptionState::Failed
        )
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionState::Idle => "idle",
            SubscriptionState::Connecting => "connecting",
            SubscriptionState::Active => "active",
            SubscriptionState::Closed => "closed",
            SubscriptionState::Failed => "failed",
        };
        f.write_str(s)
    }
}
