//! Data models for the coach-link client library.
//!
//! Lifecycle types for subscriptions plus the wire frames of the realtime
//! socket.

pub mod change_event;
pub mod change_filter;
pub mod channel_status;
pub mod purpose;
pub mod realtime_frame;
pub mod retry_policy;
pub mod session;
pub mod subscription_info;
pub mod subscription_state;
pub mod target;


pub use change_event::ChangeEvent;
pub use change_filter::{ChangeFilter, ChangeKind};
pub use channel_status::ChannelStatus;
pub use purpose::Purpose;
pub use realtime_frame::{InboundEvent, RealtimeFrame, HEARTBEAT_TOPIC};
pub use retry_policy::{FailurePath, RetryPolicy};
pub use session::Session;
pub use subscription_info::SubscriptionInfo;
pub use subscription_state::SubscriptionState;
pub use target::Target;
