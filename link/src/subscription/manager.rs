//! `RealtimeSubscriptionManager`: keeps at most one live subscription per
//! purpose pointed at the caller's current target.
//!
//! All lifecycle state lives in a background actor task. Public calls send a
//! command and await the reply; platform statuses, change events, timer
//! expiries and setup completions are posted to the same task, each tagged
//! with the generation of the attempt it belongs to. Anything tagged with a
//! generation other than the current one is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::lifecycle::{now_ms, FailureOutcome, OnChange, Subscription};
use super::timer::{Timer, TimerKind};
use crate::error::{CoachLinkError, Result};
use crate::event_handlers::{EventHandlers, StateChange, SubscriptionError};
use crate::models::{
    ChangeEvent, ChannelStatus, FailurePath, Purpose, RetryPolicy, SubscriptionInfo,
    SubscriptionState, Target,
};
use crate::platform::{ArcRealtimePlatform, ChannelHandle, ChannelSignal, ChannelSink};
use crate::timeouts::CoachLinkTimeouts;

/// Lease ids are unique across every manager in the process, so a handle
/// can never match a subscription it did not create.
static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);

/// Returned by [`RealtimeSubscriptionManager::observe`]; pass it to
/// [`release`](RealtimeSubscriptionManager::release).
///
/// A handle from an `observe` that was skipped (no session) is a no-op
/// handle: releasing it does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserveHandle {
    purpose: String,
    target: Target,
    lease: Option<u64>,
}

impl ObserveHandle {
    fn noop(purpose: &Purpose, target: Target) -> Self {
        Self {
            purpose: purpose.name.clone(),
            target,
            lease: None,
        }
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Identifier of the subscription this handle controls.
    pub fn lease(&self) -> Option<u64> {
        self.lease
    }

    /// `true` if `observe` was skipped and nothing was created.
    pub fn is_noop(&self) -> bool {
        self.lease.is_none()
    }
}

/// Tunables for one manager.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub retry_policy: RetryPolicy,
    pub timeouts: CoachLinkTimeouts,
    pub event_handlers: EventHandlers,
}

enum ManagerCmd {
    Observe {
        target: Target,
        user_id: String,
        on_event: OnChange,
        reply: oneshot::Sender<u64>,
    },
    Release {
        lease: u64,
        reply: oneshot::Sender<()>,
    },
    Info {
        reply: oneshot::Sender<Option<SubscriptionInfo>>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Everything posted to the actor from outside a public call.
enum ManagerSignal {
    Channel { generation: u64, signal: ChannelSignal },
    CoalesceElapsed { generation: u64 },
    RetryDue { generation: u64 },
    SetupFinished { generation: u64, result: Result<ChannelHandle> },
}

/// Live-update subscription manager for one [`Purpose`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn example(platform: coach_link::ArcRealtimePlatform) -> coach_link::Result<()> {
/// use coach_link::{Purpose, RealtimeSubscriptionManager, Target};
///
/// let messages = RealtimeSubscriptionManager::new(Purpose::messages(), platform);
///
/// let handle = messages
///     .observe(Target::new("conv-1")?, |event| {
///         println!("{} on {}: refetch", event.event_type, event.table);
///     })
///     .await;
///
/// // ...user navigates away
/// messages.release(&handle).await;
/// # Ok(())
/// # }
/// ```
pub struct RealtimeSubscriptionManager {
    purpose: Purpose,
    platform: ArcRealtimePlatform,
    timeouts: CoachLinkTimeouts,
    cmd_tx: mpsc::Sender<ManagerCmd>,
    _task: JoinHandle<()>,
}

impl RealtimeSubscriptionManager {
    /// Manager with default retry policy, timeouts and no hooks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(purpose: Purpose, platform: ArcRealtimePlatform) -> Self {
        Self::with_config(purpose, platform, ManagerConfig::default())
    }

    pub fn with_config(purpose: Purpose, platform: ArcRealtimePlatform, config: ManagerConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ManagerCmd>(64);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<ManagerSignal>();

        let timeouts = config.timeouts.clone();
        let actor = ManagerActor {
            purpose: purpose.clone(),
            platform: platform.clone(),
            policy: config.retry_policy,
            timeouts: config.timeouts,
            event_handlers: config.event_handlers,
            signal_tx,
            current: None,
            next_generation: 1,
            is_subscribing: false,
        };
        let task = tokio::spawn(actor.run(cmd_rx, signal_rx));

        Self {
            purpose,
            platform,
            timeouts,
            cmd_tx,
            _task: task,
        }
    }

    pub fn purpose(&self) -> &Purpose {
        &self.purpose
    }

    /// Follow `target`, calling `on_event` for each change while live.
    ///
    /// Never fails: without a session the call is skipped and a no-op handle
    /// comes back; setup failures are retried in the background. Observing
    /// the target that is already live returns the existing handle.
    pub async fn observe<F>(&self, target: Target, on_event: F) -> ObserveHandle
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let Some(user_id) = self.authenticated_user().await else {
            log::info!(
                "[coach-link] {} observe({}) skipped: no authenticated session",
                self.purpose,
                target
            );
            return ObserveHandle::noop(&self.purpose, target);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = ManagerCmd::Observe {
            target: target.clone(),
            user_id,
            on_event: Arc::new(on_event),
            reply: reply_tx,
        };
        if self.cmd_tx.send(cmd).await.is_err() {
            log::warn!("[coach-link] {} manager is shut down; observe ignored", self.purpose);
            return ObserveHandle::noop(&self.purpose, target);
        }

        match reply_rx.await {
            Ok(lease) => ObserveHandle {
                purpose: self.purpose.name.clone(),
                target,
                lease: Some(lease),
            },
            Err(_) => ObserveHandle::noop(&self.purpose, target),
        }
    }

    /// Stop the subscription `handle` refers to. Idempotent.
    ///
    /// Handles of superseded subscriptions and no-op handles are ignored.
    pub async fn release(&self, handle: &ObserveHandle) {
        let Some(lease) = handle.lease else {
            return;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ManagerCmd::Release {
                lease,
                reply: reply_tx,
            })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    /// Snapshot of the current subscription, if any was ever created.
    pub async fn info(&self) -> Option<SubscriptionInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(ManagerCmd::Info { reply: reply_tx }).await.ok()?;
        reply_rx.await.ok().flatten()
    }

    /// Lifecycle state of the current subscription (`Idle` if none).
    pub async fn state(&self) -> SubscriptionState {
        self.info().await.map(|info| info.state).unwrap_or(SubscriptionState::Idle)
    }

    /// Release everything and stop the actor.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ManagerCmd::Shutdown {
                reply: Some(reply_tx),
            })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn authenticated_user(&self) -> Option<String> {
        let lookup = self.platform.get_session();
        let result = if CoachLinkTimeouts::is_no_timeout(self.timeouts.session_timeout) {
            lookup.await
        } else {
            match tokio::time::timeout(self.timeouts.session_timeout, lookup).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!(
                        "[coach-link] Session lookup timed out after {:?}",
                        self.timeouts.session_timeout
                    );
                    return None;
                },
            }
        };

        match result {
            Ok(session) => session.user().map(str::to_string),
            Err(e) => {
                log::warn!("[coach-link] Session lookup failed: {}", e);
                None
            },
        }
    }
}

impl Drop for RealtimeSubscriptionManager {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(ManagerCmd::Shutdown { reply: None });
    }
}

// ── Actor ───────────────────────────────────────────────────────────────────

struct ManagerActor {
    purpose: Purpose,
    platform: ArcRealtimePlatform,
    policy: RetryPolicy,
    timeouts: CoachLinkTimeouts,
    event_handlers: EventHandlers,
    signal_tx: mpsc::UnboundedSender<ManagerSignal>,
    current: Option<Subscription>,
    next_generation: u64,
    /// A `subscribe_to_changes` call is in flight.
    is_subscribing: bool,
}

impl ManagerActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ManagerCmd>,
        mut signal_rx: mpsc::UnboundedReceiver<ManagerSignal>,
    ) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ManagerCmd::Shutdown { reply }) => {
                        self.close_current().await;
                        if let Some(reply) = reply {
                            let _ = reply.send(());
                        }
                        break;
                    },
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.close_current().await;
                        break;
                    },
                },
                Some(signal) = signal_rx.recv() => self.handle_signal(signal).await,
            }
        }
        log::debug!("[coach-link] {} manager stopped", self.purpose);
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    async fn handle_command(&mut self, cmd: ManagerCmd) {
        match cmd {
            ManagerCmd::Observe {
                target,
                user_id,
                on_event,
                reply,
            } => {
                let lease = self.observe(target, user_id, on_event).await;
                let _ = reply.send(lease);
            },
            ManagerCmd::Release { lease, reply } => {
                match &self.current {
                    Some(sub) if sub.lease() == lease => self.close_current().await,
                    _ => log::debug!("[coach-link] {} release of stale lease {} ignored", self.purpose, lease),
                }
                let _ = reply.send(());
            },
            ManagerCmd::Info { reply } => {
                let info = self.current.as_ref().map(|sub| sub.info(&self.purpose.name));
                let _ = reply.send(info);
            },
            // Handled by the run loop.
            ManagerCmd::Shutdown { .. } => {},
        }
    }

    async fn observe(&mut self, target: Target, user_id: String, on_event: OnChange) -> u64 {
        if let Some(sub) = &self.current {
            if sub.target() == &target && sub.state().is_live() {
                log::debug!(
                    "[coach-link] {} already following {} ({})",
                    self.purpose,
                    target,
                    sub.state()
                );
                return sub.lease();
            }
        }

        self.close_current().await;

        let lease = NEXT_LEASE.fetch_add(1, Ordering::Relaxed);
        let generation = self.bump_generation();
        let mut sub = Subscription::new(lease, target, user_id, on_event, generation);
        log::info!("[coach-link] {} following {}", self.purpose, sub.target());
        self.transition(&mut sub, SubscriptionState::Connecting);
        self.current = Some(sub);

        if self.timeouts.coalesce_delay.is_zero() {
            self.begin_setup();
        } else {
            let tx = self.signal_tx.clone();
            let timer = Timer::start(TimerKind::Coalesce, self.timeouts.coalesce_delay, move || {
                let _ = tx.send(ManagerSignal::CoalesceElapsed { generation });
            });
            if let Some(sub) = self.current.as_mut() {
                sub.set_timer(timer);
            }
        }

        lease
    }

    fn transition(&self, sub: &mut Subscription, next: SubscriptionState) {
        if let Some(from) = sub.transition(next) {
            log::debug!(
                "[coach-link] {}[{}]: {} -> {} (gen {})",
                self.purpose,
                sub.target(),
                from,
                next,
                sub.generation()
            );
            self.event_handlers.emit_state_change(StateChange {
                purpose: self.purpose.name.clone(),
                target: sub.target().to_string(),
                from,
                to: next,
                retry_count: sub.retry_count(),
            });
        }
    }

    /// Tear down the current subscription: cancel timers, unregister the
    /// channel and move to `Closed`. No-op if already closed.
    async fn close_current(&mut self) {
        let Some(mut sub) = self.current.take() else {
            return;
        };
        if sub.state() != SubscriptionState::Closed {
            sub.cancel_timer();
            sub.set_setup_deferred(false);
            if let Some(handle) = sub.take_channel() {
                release_channel(&self.platform, handle).await;
            }
            self.transition(&mut sub, SubscriptionState::Closed);
            log::info!("[coach-link] {} released {}", self.purpose, sub.target());
        }
        self.current = Some(sub);
    }

    /// Register a channel for the current attempt, unless another setup is
    /// still in flight, in which case this one waits for it to finish.
    fn begin_setup(&mut self) {
        let Some(sub) = self.current.as_mut() else {
            return;
        };
        if sub.state() != SubscriptionState::Connecting {
            return;
        }
        if self.is_subscribing {
            log::debug!(
                "[coach-link] {} setup for {} deferred: previous setup in flight",
                self.purpose,
                sub.target()
            );
            sub.set_setup_deferred(true);
            return;
        }
        sub.set_setup_deferred(false);

        let generation = sub.generation();
        let nonce = format!("{}-{}", now_ms(), generation);
        let channel_name = self.purpose.channel_name(sub.target(), sub.user_id(), &nonce);
        let filter = self.purpose.filter_for(sub.target());
        sub.set_channel_name(channel_name.clone());
        self.is_subscribing = true;

        log::debug!("[coach-link] {} subscribing {}", self.purpose, channel_name);

        let forward_tx = self.signal_tx.clone();
        let sink = ChannelSink::new(generation, move |generation, signal| {
            forward_tx
                .send(ManagerSignal::Channel { generation, signal })
                .is_ok()
        });

        let platform = self.platform.clone();
        let done_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            let result = platform.subscribe_to_changes(&channel_name, &filter, sink).await;
            let _ = done_tx.send(ManagerSignal::SetupFinished { generation, result });
        });
    }

    async fn handle_signal(&mut self, signal: ManagerSignal) {
        match signal {
            ManagerSignal::CoalesceElapsed { generation } => {
                let due = match self.current.as_mut() {
                    Some(sub) if sub.is_current(generation) => sub.clear_fired_timer(TimerKind::Coalesce),
                    _ => false,
                };
                if due {
                    self.begin_setup();
                }
            },
            ManagerSignal::RetryDue { generation } => self.retry(generation).await,
            ManagerSignal::SetupFinished { generation, result } => {
                self.setup_finished(generation, result).await
            },
            ManagerSignal::Channel {
                generation,
                signal: ChannelSignal::Status(status),
            } => self.channel_status(generation, status).await,
            ManagerSignal::Channel {
                generation,
                signal: ChannelSignal::Change(event),
            } => match self.current.as_mut() {
                Some(sub) if sub.is_current(generation) => {
                    if !sub.deliver(event) {
                        log::debug!(
                            "[coach-link] {} dropped change for {} while {}",
                            self.purpose,
                            sub.target(),
                            sub.state()
                        );
                    }
                },
                _ => log::debug!("[coach-link] {} discarded stale change (gen {})", self.purpose, generation),
            },
        }
    }

    async fn setup_finished(&mut self, generation: u64, result: Result<ChannelHandle>) {
        self.is_subscribing = false;

        let is_current = self
            .current
            .as_ref()
            .is_some_and(|sub| sub.is_current(generation));

        match (is_current, result) {
            (true, Ok(handle)) => {
                if let Some(sub) = self.current.as_mut() {
                    if let Some(displaced) = sub.attach_channel(handle) {
                        release_channel(&self.platform, displaced).await;
                    }
                }
            },
            (true, Err(e)) => {
                let error = match e {
                    CoachLinkError::SetupError(_) => e,
                    other => CoachLinkError::SetupError(other.to_string()),
                };
                self.fail_current(FailurePath::SetupException, error);
            },
            (false, Ok(handle)) => {
                log::debug!(
                    "[coach-link] {} unsubscribing abandoned channel {}",
                    self.purpose,
                    handle.channel_name()
                );
                release_channel(&self.platform, handle).await;
            },
            (false, Err(e)) => {
                log::debug!("[coach-link] {} abandoned setup failed: {}", self.purpose, e);
            },
        }

        let deferred = self.current.as_ref().is_some_and(|sub| sub.setup_deferred());
        if deferred {
            self.begin_setup();
        }
    }

    async fn channel_status(&mut self, generation: u64, status: ChannelStatus) {
        let Some(mut sub) = self.current.take() else {
            return;
        };
        if !sub.is_current(generation) {
            log::debug!(
                "[coach-link] {} discarded stale {} (gen {}, current {})",
                self.purpose,
                status,
                generation,
                sub.generation()
            );
            self.current = Some(sub);
            return;
        }

        match status {
            ChannelStatus::Subscribed => {
                // Recovered before a pending retry fired.
                sub.cancel_timer();
                sub.mark_active();
                self.transition(&mut sub, SubscriptionState::Active);
                log::info!("[coach-link] {} live for {}", self.purpose, sub.target());
                self.current = Some(sub);
            },
            ChannelStatus::Closed => {
                log::info!("[coach-link] {} channel for {} closed", self.purpose, sub.target());
                sub.cancel_timer();
                if let Some(handle) = sub.take_channel() {
                    release_channel(&self.platform, handle).await;
                }
                self.transition(&mut sub, SubscriptionState::Closed);
                self.current = Some(sub);
            },
            ChannelStatus::ChannelError => {
                self.current = Some(sub);
                self.fail_current(
                    FailurePath::ChannelStatus,
                    CoachLinkError::ChannelError("platform reported CHANNEL_ERROR".to_string()),
                );
            },
            ChannelStatus::TimedOut => {
                self.current = Some(sub);
                self.fail_current(
                    FailurePath::ChannelStatus,
                    CoachLinkError::TimedOut("platform reported TIMED_OUT".to_string()),
                );
            },
        }
    }

    fn fail_current(&mut self, path: FailurePath, error: CoachLinkError) {
        let Some(mut sub) = self.current.take() else {
            return;
        };
        if sub.state() != SubscriptionState::Failed {
            self.transition(&mut sub, SubscriptionState::Failed);
        }

        let outcome = sub.record_failure(&self.policy, path, error.to_string());
        match outcome {
            FailureOutcome::RetryIn(delay) => {
                log::warn!(
                    "[coach-link] {} {} failed ({}); retry {}/{} in {:?}",
                    self.purpose,
                    sub.target(),
                    error,
                    sub.retry_count(),
                    self.policy.max_retries,
                    delay
                );
                let generation = sub.generation();
                let tx = self.signal_tx.clone();
                sub.set_timer(Timer::start(TimerKind::Retry, delay, move || {
                    let _ = tx.send(ManagerSignal::RetryDue { generation });
                }));
                self.emit_error(&sub, error, true);
            },
            FailureOutcome::AlreadyScheduled => {
                log::debug!(
                    "[coach-link] {} {} failed again ({}); retry already scheduled",
                    self.purpose,
                    sub.target(),
                    error
                );
            },
            FailureOutcome::GaveUp { attempts } => {
                log::warn!(
                    "[coach-link] {} {} failed ({}); giving up after {} attempt(s)",
                    self.purpose,
                    sub.target(),
                    error,
                    attempts
                );
                self.emit_error(&sub, CoachLinkError::RetryCeilingExceeded { attempts }, false);
            },
            FailureOutcome::Exhausted => {
                log::debug!("[coach-link] {} {} failed after giving up: {}", self.purpose, sub.target(), error);
            },
        }
        self.current = Some(sub);
    }

    fn emit_error(&self, sub: &Subscription, error: CoachLinkError, recoverable: bool) {
        self.event_handlers.emit_error(SubscriptionError {
            purpose: self.purpose.name.clone(),
            target: sub.target().to_string(),
            error,
            recoverable,
        });
    }

    async fn retry(&mut self, generation: u64) {
        let Some(mut sub) = self.current.take() else {
            return;
        };
        if !sub.is_current(generation) || !sub.clear_fired_timer(TimerKind::Retry) {
            self.current = Some(sub);
            return;
        }

        if let Some(handle) = sub.take_channel() {
            release_channel(&self.platform, handle).await;
        }
        let generation = self.bump_generation();
        sub.begin_attempt(generation);
        self.transition(&mut sub, SubscriptionState::Connecting);
        log::info!(
            "[coach-link] {} retrying {} (attempt {})",
            self.purpose,
            sub.target(),
            sub.retry_count() + 1
        );
        self.current = Some(sub);
        self.begin_setup();
    }
}

async fn release_channel(platform: &ArcRealtimePlatform, handle: ChannelHandle) {
    let name = handle.channel_name().to_string();
    if let Err(e) = platform.unsubscribe(handle).await {
        log::warn!("[coach-link] Failed to unsubscribe {}: {}", name, e);
    }
}
