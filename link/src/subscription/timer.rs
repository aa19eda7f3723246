//! One-shot timers that can be cancelled before they fire.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

/// What a pending timer will trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// End of the coalescing window after a target change.
    Coalesce,
    /// Backoff before the next connection attempt.
    Retry,
}

/// A spawned sleep that runs `on_fire` once, unless cancelled first.
///
/// Dropping the timer cancels it.
#[derive(Debug)]
pub(crate) struct Timer {
    kind: TimerKind,
    handle: JoinHandle<()>,
}

impl Timer {
    pub(crate) fn start<F>(kind: TimerKind, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = TokioInstant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire();
        });
        Self { kind, handle }
    }

    pub(crate) fn kind(&self) -> TimerKind {
        self.kind
    }

    pub(crate) fn cancel(self) {
        drop(self);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
