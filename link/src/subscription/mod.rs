//! Subscription lifecycle: the per-target subscription object, its
//! cancellable timers and the [`RealtimeSubscriptionManager`] actor.

mod lifecycle;
mod manager;
mod timer;

pub use lifecycle::OnChange;
pub use manager::{ManagerConfig, ObserveHandle, RealtimeSubscriptionManager};
