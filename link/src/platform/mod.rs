//! The backend platform's realtime primitive, as seen by the managers.
//!
//! [`RealtimePlatform`] is the only seam between the subscription lifecycle
//! and the outside world: session lookup, channel registration and channel
//! removal. [`RealtimeSocket`] implements it over the platform's realtime
//! WebSocket; tests substitute an in-memory implementation.

mod session;
mod socket;

pub use session::{AuthEndpointSession, SessionProvider, StaticSession};
pub use socket::{RealtimeSocket, SocketConfig};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ChangeEvent, ChangeFilter, ChannelStatus, Session};

/// Something the platform reports on a registered channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

type Forward = Arc<dyn Fn(u64, ChannelSignal) -> bool + Send + Sync>;

/// Where a platform pushes statuses and change events for one channel.
///
/// Each sink is stamped with the generation token of the attempt that
/// created it; the receiving side decides whether that generation is still
/// current. Cloning is cheap.
#[derive(Clone)]
pub struct ChannelSink {
    generation: u64,
    forward: Forward,
}

impl ChannelSink {
    /// Build a sink that hands every signal to `forward` together with
    /// `generation`. `forward` returns `false` once nobody is listening.
    pub fn new(generation: u64, forward: impl Fn(u64, ChannelSignal) -> bool + Send + Sync + 'static) -> Self {
        Self {
            generation,
            forward: Arc::new(forward),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a status transition. Returns `false` if the receiver is gone.
    pub fn status(&self, status: ChannelStatus) -> bool {
        (self.forward)(self.generation, ChannelSignal::Status(status))
    }

    /// Deliver a change event. Returns `false` if the receiver is gone.
    pub fn change(&self, event: ChangeEvent) -> bool {
        (self.forward)(self.generation, ChannelSignal::Change(event))
    }
}

impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink").field("generation", &self.generation).finish()
    }
}

/// Opaque handle to a channel registration.
///
/// Owned by exactly one subscription attempt and consumed by
/// [`RealtimePlatform::unsubscribe`].
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelHandle {
    id: u64,
    channel_name: String,
}

impl ChannelHandle {
    pub fn new(id: u64, channel_name: impl Into<String>) -> Self {
        Self {
            id,
            channel_name: channel_name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }
}

/// The platform's publish/subscribe primitive plus its session gate.
///
/// # Example
///
/// ```rust,no_run
/// use coach_link::{
///     ChangeFilter, ChannelHandle, ChannelSink, ChannelStatus, RealtimePlatform, Session,
/// };
///
/// struct AlwaysSubscribed;
///
/// #[async_trait::async_trait]
/// impl RealtimePlatform for AlwaysSubscribed {
///     async fn get_session(&self) -> coach_link::Result<Session> {
///         Ok(Session::authenticated("user-1"))
///     }
///
///     async fn subscribe_to_changes(
///         &self,
///         channel_name: &str,
///         _filter: &ChangeFilter,
///         sink: ChannelSink,
///     ) -> coach_link::Result<ChannelHandle> {
///         sink.status(ChannelStatus::Subscribed);
///         Ok(ChannelHandle::new(1, channel_name))
///     }
///
///     async fn unsubscribe(&self, _handle: ChannelHandle) -> coach_link::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RealtimePlatform: Send + Sync + 'static {
    /// Current session; `valid == false` (or no user id) means "not signed in".
    async fn get_session(&self) -> Result<Session>;

    /// Register `channel_name` for changes matching `filter`.
    ///
    /// Returns once the registration is issued; the outcome arrives later as
    /// a status on `sink`. An `Err` here is a setup failure.
    async fn subscribe_to_changes(
        &self,
        channel_name: &str,
        filter: &ChangeFilter,
        sink: ChannelSink,
    ) -> Result<ChannelHandle>;

    /// Remove a registration. Unknown or already-removed handles are a no-op.
    async fn unsubscribe(&self, handle: ChannelHandle) -> Result<()>;
}

/// Shared, dynamically dispatched platform.
pub type ArcRealtimePlatform = Arc<dyn RealtimePlatform>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_sink_stamps_generation() {
        let seen: Arc<Mutex<Vec<(u64, ChannelSignal)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let sink = ChannelSink::new(7, move |gen, signal| {
            log.lock().unwrap().push((gen, signal));
            true
        });

        assert!(sink.status(ChannelStatus::Subscribed));
        assert!(sink.clone().change(ChangeEvent::new("INSERT", "public", "messages")));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(gen, _)| *gen == 7));
        assert_eq!(seen[0].1, ChannelSignal::Status(ChannelStatus::Subscribed));
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let sink = ChannelSink::new(1, |_, _| false);
        assert!(!sink.status(ChannelStatus::Closed));
    }

    #[test]
    fn test_channel_handle_accessors() {
        let handle = ChannelHandle::new(3, "messages:c1:u1:1");
        assert_eq!(handle.id(), 3);
        assert_eq!(handle.channel_name(), "messages:c1:u1:1");
    }
}
