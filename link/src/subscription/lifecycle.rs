//! The per-target subscription object and its state machine.
//!
//! A [`Subscription`] owns every lifecycle flag for one target: state,
//! retry count, generation, the channel handle and any pending timer. The
//! manager's actor is its only owner, so none of this needs locking.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::timer::{Timer, TimerKind};
use crate::models::{
    ChangeEvent, FailurePath, RetryPolicy, SubscriptionInfo, SubscriptionState, Target,
};
use crate::platform::ChannelHandle;

/// Callback invoked for every change event while a subscription is active.
pub type OnChange = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Current time in millis since Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// What a failure report led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// Retry after the given delay.
    RetryIn(Duration),
    /// A retry is already pending for this failure burst.
    AlreadyScheduled,
    /// The ceiling is reached; the subscription stays failed.
    GaveUp { attempts: u32 },
    /// Already gave up earlier; nothing more to do.
    Exhausted,
}

pub(crate) struct Subscription {
    lease: u64,
    target: Target,
    user_id: String,
    on_event: OnChange,
    state: SubscriptionState,
    retry_count: u32,
    generation: u64,
    gave_up: bool,
    setup_deferred: bool,
    channel: Option<ChannelHandle>,
    channel_name: Option<String>,
    timer: Option<Timer>,
    created_at_ms: u64,
    last_event_time_ms: Option<u64>,
    last_error: Option<String>,
}

impl Subscription {
    pub(crate) fn new(lease: u64, target: Target, user_id: String, on_event: OnChange, generation: u64) -> Self {
        Self {
            lease,
            target,
            user_id,
            on_event,
            state: SubscriptionState::Idle,
            retry_count: 0,
            generation,
            gave_up: false,
            setup_deferred: false,
            channel: None,
            channel_name: None,
            timer: None,
            created_at_ms: now_ms(),
            last_event_time_ms: None,
            last_error: None,
        }
    }

    pub(crate) fn lease(&self) -> u64 {
        self.lease
    }

    pub(crate) fn target(&self) -> &Target {
        &self.target
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Signals tagged with `generation` may still change this subscription.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state != SubscriptionState::Closed
    }

    /// Move to `next` if the transition table allows it.
    ///
    /// Returns the previous state on success.
    pub(crate) fn transition(&mut self, next: SubscriptionState) -> Option<SubscriptionState> {
        let from = self.state;
        if !from.can_transition_to(next) {
            log::debug!(
                "[coach-link] Ignoring transition {} -> {} for {}",
                from,
                next,
                self.target
            );
            return None;
        }
        self.state = next;
        Some(from)
    }

    /// Start a new attempt under `generation`.
    pub(crate) fn begin_attempt(&mut self, generation: u64) {
        self.generation = generation;
        self.channel_name = None;
    }

    pub(crate) fn set_channel_name(&mut self, name: String) {
        self.channel_name = Some(name);
    }

    /// Store the handle of the current attempt, returning a displaced one.
    pub(crate) fn attach_channel(&mut self, handle: ChannelHandle) -> Option<ChannelHandle> {
        self.channel.replace(handle)
    }

    pub(crate) fn take_channel(&mut self) -> Option<ChannelHandle> {
        self.channel.take()
    }

    pub(crate) fn setup_deferred(&self) -> bool {
        self.setup_deferred
    }

    pub(crate) fn set_setup_deferred(&mut self, deferred: bool) {
        self.setup_deferred = deferred;
    }

    pub(crate) fn set_timer(&mut self, timer: Timer) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.cancel();
        }
    }

    /// Forget a timer that has fired, if it is of `kind`.
    pub(crate) fn clear_fired_timer(&mut self, kind: TimerKind) -> bool {
        match &self.timer {
            Some(timer) if timer.kind() == kind => {
                self.timer = None;
                true
            },
            _ => false,
        }
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    pub(crate) fn retry_scheduled(&self) -> bool {
        matches!(&self.timer, Some(timer) if timer.kind() == TimerKind::Retry)
    }

    /// `SUBSCRIBED`: the failure streak is over.
    pub(crate) fn mark_active(&mut self) {
        self.retry_count = 0;
        self.gave_up = false;
        self.last_error = None;
    }

    /// Count a failure and decide whether another attempt follows.
    pub(crate) fn record_failure(
        &mut self,
        policy: &RetryPolicy,
        path: FailurePath,
        reason: String,
    ) -> FailureOutcome {
        self.last_error = Some(reason);
        if self.gave_up {
            return FailureOutcome::Exhausted;
        }
        if self.retry_scheduled() {
            return FailureOutcome::AlreadyScheduled;
        }

        self.retry_count = (self.retry_count + 1).min(policy.max_retries);
        if policy.allows_retry(self.retry_count) {
            FailureOutcome::RetryIn(policy.backoff(path, self.retry_count))
        } else {
            self.gave_up = true;
            FailureOutcome::GaveUp {
                attempts: self.retry_count,
            }
        }
    }

    /// Hand an event to the consumer. Only active subscriptions deliver.
    pub(crate) fn deliver(&mut self, event: ChangeEvent) -> bool {
        if self.state != SubscriptionState::Active {
            return false;
        }
        self.last_event_time_ms = Some(now_ms());
        (self.on_event)(event);
        true
    }

    pub(crate) fn info(&self, purpose: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            purpose: purpose.to_string(),
            lease: self.lease,
            target: self.target.to_string(),
            state: self.state,
            retry_count: self.retry_count,
            generation: self.generation,
            channel_name: self.channel_name.clone(),
            retry_scheduled: self.retry_scheduled(),
            created_at_ms: self.created_at_ms,
            last_event_time_ms: self.last_event_time_ms,
            last_error: self.last_error.clone(),
        }
    }
}
