//! Lifecycle event hooks for coach-link.
//!
//! All hooks are optional and purely diagnostic. Subscription failures are
//! never returned to callers of `observe`/`release`; registering
//! [`on_error`](EventHandlers::on_error) is the only way to notice that a
//! subscription gave up after its retry ceiling.
//!
//! - [`on_state_change`](EventHandlers::on_state_change): a subscription moved between lifecycle states
//! - [`on_error`](EventHandlers::on_error): a subscription attempt failed (with `recoverable = false` once retries are exhausted)
//! - [`on_connect`](EventHandlers::on_connect) / [`on_disconnect`](EventHandlers::on_disconnect): the realtime socket opened or closed
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send): raw socket frames (debug)
//!
//! # Example
//!
//! ```rust
//! use coach_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_state_change(|change| println!("{}", change))
//!     .on_error(|err| {
//!         if !err.recoverable {
//!             eprintln!("live updates stopped: {}", err);
//!         }
//!     });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::CoachLinkError;
use crate::models::SubscriptionState;

/// Reason for a socket disconnect.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    pub message: String,
    /// WebSocket close code, if available.
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// A subscription moved from one lifecycle state to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub purpose: String,
    pub target: String,
    pub from: SubscriptionState,
    pub to: SubscriptionState,
    pub retry_count: u32,
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} -> {} (retries: {})",
            self.purpose, self.target, self.from, self.to, self.retry_count
        )
    }
}

/// A failed subscription attempt.
#[derive(Debug, Clone)]
pub struct SubscriptionError {
    pub purpose: String,
    pub target: String,
    pub error: CoachLinkError,
    /// `false` once the retry ceiling is reached; no further automatic
    /// attempt follows. A platform `CLOSED` is a teardown rather than an
    /// error and shows up only through `on_state_change`.
    pub recoverable: bool,
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.purpose, self.target, self.error)
    }
}

pub type OnStateChangeCallback = Arc<dyn Fn(StateChange) + Send + Sync>;

pub type OnErrorCallback = Arc<dyn Fn(SubscriptionError) + Send + Sync>;

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Debug hook for raw frames (inbound or outbound).
pub type OnFrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional lifecycle hooks, shared by the managers and the socket adapter.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_state_change: Option<OnStateChangeCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_receive: Option<OnFrameCallback>,
    pub(crate) on_send: Option<OnFrameCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create an empty set of handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on every lifecycle transition of any subscription.
    pub fn on_state_change(mut self, f: impl Fn(StateChange) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Called whenever a subscription attempt fails.
    pub fn on_error(mut self, f: impl Fn(SubscriptionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called when the realtime socket is established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when the realtime socket closes, intentionally or not.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Debug hook receiving every raw inbound frame.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Debug hook receiving every raw outbound frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_state_change.is_some()
            || self.on_error.is_some()
            || self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_state_change(&self, change: StateChange) {
        if let Some(cb) = &self.on_state_change {
            cb(change);
        }
    }

    pub(crate) fn emit_error(&self, error: SubscriptionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_connect();
        handlers.emit_disconnect(DisconnectReason::new("bye"));
    }

    #[test]
    fn test_state_change_dispatch() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handlers = EventHandlers::new().on_state_change(move |change| {
            assert_eq!(change.to, SubscriptionState::Active);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handlers.has_any());
        handlers.emit_state_change(StateChange {
            purpose: "messages".into(),
            target: "c1".into(),
            from: SubscriptionState::Connecting,
            to: SubscriptionState::Active,
            retry_count: 0,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_display_formats() {
        let change = StateChange {
            purpose: "notifications".into(),
            target: "c9".into(),
            from: SubscriptionState::Failed,
            to: SubscriptionState::Connecting,
            retry_count: 2,
        };
        assert_eq!(change.to_string(), "notifications[c9]: failed -> connecting (retries: 2)");

        let reason = DisconnectReason::with_code("going away", 1001);
        assert_eq!(reason.to_string(), "going away (code: 1001)");
    }

    #[test]
    fn test_debug_shows_registration_only() {
        let handlers = EventHandlers::new().on_send(|_| {});
        let debug = format!("{:?}", handlers);
        assert!(debug.contains("on_send: true"));
        assert!(debug.contains("on_receive: false"));
    }
}
