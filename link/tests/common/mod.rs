//! Shared helpers for coach-link integration tests.
//!
//! [`MockPlatform`] is an in-memory [`RealtimePlatform`] that records every
//! registration and lets a test push statuses and change events into the
//! sink of any registration, current or stale.

#![allow(dead_code)]

use async_trait::async_trait;
use coach_link::{
    ChangeEvent, ChangeFilter, ChannelHandle, ChannelSink, ChannelStatus, CoachLinkError,
    CoachLinkTimeouts, ManagerConfig, Purpose, RealtimePlatform, RealtimeSubscriptionManager,
    RetryPolicy, Session,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct Registration {
    pub id: u64,
    pub channel_name: String,
    pub filter: ChangeFilter,
    pub sink: ChannelSink,
    pub active: bool,
}

#[derive(Default)]
struct MockState {
    session: Option<Session>,
    failing_setups: u32,
    setup_delay: Option<Duration>,
    registrations: Vec<Registration>,
    next_id: u64,
    max_active: usize,
    session_calls: usize,
    unsubscribe_calls: usize,
}

impl MockState {
    fn active(&self) -> usize {
        self.registrations.iter().filter(|r| r.active).count()
    }
}

pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    /// Platform with a signed-in `user-1`.
    pub fn new() -> Arc<Self> {
        Self::with_session(Session::authenticated("user-1"))
    }

    pub fn without_session() -> Arc<Self> {
        Self::with_session(Session::none())
    }

    pub fn with_session(session: Session) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                session: Some(session),
                next_id: 1,
                ..MockState::default()
            }),
        })
    }

    /// The next `n` calls to `subscribe_to_changes` return an error.
    pub fn fail_next_setups(&self, n: u32) {
        self.state.lock().unwrap().failing_setups = n;
    }

    /// `subscribe_to_changes` registers immediately but returns only after
    /// `delay` (paused clock).
    pub fn set_setup_delay(&self, delay: Duration) {
        self.state.lock().unwrap().setup_delay = Some(delay);
    }

    pub fn registration_count(&self) -> usize {
        self.state.lock().unwrap().registrations.len()
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().unwrap().active()
    }

    /// Highest number of simultaneously active registrations seen.
    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    pub fn session_calls(&self) -> usize {
        self.state.lock().unwrap().session_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unwrap().unsubscribe_calls
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.state.lock().unwrap().registrations[index].active
    }

    pub fn channel_name(&self, index: usize) -> String {
        self.state.lock().unwrap().registrations[index].channel_name.clone()
    }

    pub fn filter(&self, index: usize) -> ChangeFilter {
        self.state.lock().unwrap().registrations[index].filter.clone()
    }

    fn sink(&self, index: usize) -> ChannelSink {
        self.state.lock().unwrap().registrations[index].sink.clone()
    }

    /// Push a status into registration `index` (0-based, in creation order).
    pub fn emit_status(&self, index: usize, status: ChannelStatus) -> bool {
        self.sink(index).status(status)
    }

    pub fn emit_change(&self, index: usize, event: ChangeEvent) -> bool {
        self.sink(index).change(event)
    }

    /// Push a status into the newest registration.
    pub fn emit_status_latest(&self, status: ChannelStatus) -> bool {
        let last = self.registration_count() - 1;
        self.emit_status(last, status)
    }
}

#[async_trait]
impl RealtimePlatform for MockPlatform {
    async fn get_session(&self) -> coach_link::Result<Session> {
        let mut state = self.state.lock().unwrap();
        state.session_calls += 1;
        Ok(state.session.clone().unwrap_or_else(Session::none))
    }

    async fn subscribe_to_changes(
        &self,
        channel_name: &str,
        filter: &ChangeFilter,
        sink: ChannelSink,
    ) -> coach_link::Result<ChannelHandle> {
        let (id, delay) = {
            let mut state = self.state.lock().unwrap();
            if state.failing_setups > 0 {
                state.failing_setups -= 1;
                return Err(CoachLinkError::NetworkError("connection refused".to_string()));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.registrations.push(Registration {
                id,
                channel_name: channel_name.to_string(),
                filter: filter.clone(),
                sink,
                active: true,
            });
            let active = state.active();
            state.max_active = state.max_active.max(active);
            (id, state.setup_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ChannelHandle::new(id, channel_name))
    }

    async fn unsubscribe(&self, handle: ChannelHandle) -> coach_link::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.unsubscribe_calls += 1;
        if let Some(reg) = state.registrations.iter_mut().find(|r| r.id == handle.id()) {
            reg.active = false;
        }
        Ok(())
    }
}

/// Manager with test timeouts (10ms coalescing) and the default policy.
pub fn manager(platform: &Arc<MockPlatform>, purpose: Purpose) -> RealtimeSubscriptionManager {
    manager_with_policy(platform, purpose, RetryPolicy::default())
}

pub fn manager_with_policy(
    platform: &Arc<MockPlatform>,
    purpose: Purpose,
    retry_policy: RetryPolicy,
) -> RealtimeSubscriptionManager {
    RealtimeSubscriptionManager::with_config(
        purpose,
        platform.clone(),
        ManagerConfig {
            retry_policy,
            timeouts: CoachLinkTimeouts::for_testing(),
            ..ManagerConfig::default()
        },
    )
}

pub const COALESCE: Duration = Duration::from_millis(10);

/// Let spawned tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock, then let woken tasks run.
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Counts `on_event` invocations.
#[derive(Clone, Default)]
pub struct EventCounter(Arc<AtomicUsize>);

impl EventCounter {
    pub fn callback(&self) -> impl Fn(ChangeEvent) + Send + Sync + 'static {
        let count = self.0.clone();
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn insert_event() -> ChangeEvent {
    ChangeEvent::new("INSERT", "public", "messages")
}
