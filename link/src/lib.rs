//! # coach-link
//!
//! Realtime subscription client for the coaching backend.
//!
//! Views that show a conversation want "something changed, refetch" signals
//! for two independent streams: new messages and notifications. Each stream
//! gets a [`RealtimeSubscriptionManager`], which keeps at most one live
//! channel pointed at the current conversation and handles the awkward
//! parts:
//!
//! - rapid target changes are coalesced into one setup
//! - only one setup is in flight at a time, and late results of abandoned
//!   setups are unsubscribed and ignored
//! - `CHANNEL_ERROR` / `TIMED_OUT` and setup failures are retried with a
//!   linear, capped backoff up to a ceiling (3 by default)
//! - a released subscription never calls back again
//!
//! Failures never surface from `observe`/`release`; register
//! [`EventHandlers::on_error`] to be told when a subscription gives up.
//!
//! ## Example
//!
//! ```rust,no_run
//! use coach_link::{CoachLinkClient, EventHandlers, Target};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CoachLinkClient::builder()
//!     .base_url("https://coach.example.com")
//!     .api_key("public-anon-key")
//!     .access_token("user-access-token")
//!     .event_handlers(EventHandlers::new().on_state_change(|c| log::debug!("{}", c)))
//!     .build()?;
//!
//! let messages = client.messages();
//! let notifications = client.notifications();
//!
//! let conversation = Target::new("conv-1")?;
//! let m = messages.observe(conversation.clone(), |_| { /* refetch messages */ }).await;
//! let n = notifications.observe(conversation, |_| { /* refetch notifications */ }).await;
//!
//! messages.release(&m).await;
//! notifications.release(&n).await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod platform;
pub mod subscription;
pub mod timeouts;

pub use client::{CoachLinkClient, CoachLinkClientBuilder};
pub use error::{CoachLinkError, Result};
pub use event_handlers::{
    DisconnectReason, EventHandlers, OnConnectCallback, OnDisconnectCallback, OnErrorCallback,
    OnFrameCallback, OnStateChangeCallback, StateChange, SubscriptionError,
};
pub use models::{
    ChangeEvent, ChangeFilter, ChangeKind, ChannelStatus, FailurePath, Purpose, RetryPolicy,
    Session, SubscriptionInfo, SubscriptionState, Target,
};
pub use platform::{
    ArcRealtimePlatform, AuthEndpointSession, ChannelHandle, ChannelSignal, ChannelSink,
    RealtimePlatform, RealtimeSocket, SessionProvider, SocketConfig, StaticSession,
};
pub use subscription::{ManagerConfig, ObserveHandle, OnChange, RealtimeSubscriptionManager};
pub use timeouts::{CoachLinkTimeouts, CoachLinkTimeoutsBuilder};
