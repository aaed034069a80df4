//! # Timeout scheduling contract.
//!
//! A [`TimeoutScheduler`] runs a closure once after a delay and returns a
//! [`TimeoutHandle`] that can cancel it. Cancellation is best effort: a
//! [`UnitOfWork`](crate::UnitOfWork) still guards against late timeouts
//! through its own state check.

use std::fmt;
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Something that can be cancelled.
pub trait Cancel: Send + Sync {
    /// Cancels; repeated calls are no-ops.
    fn cancel(&self);
}

/// Owned handle to a scheduled timeout.
pub type TimeoutHandle = Box<dyn Cancel>;

/// Schedules one-shot delayed callbacks.
pub trait TimeoutScheduler: Send + Sync {
    /// Runs `f` once after `delay` unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce() + Send + 'static>) -> TimeoutHandle;
}

impl Cancel for CancellationToken {
    fn cancel(&self) {
        CancellationToken::cancel(self);
    }
}

impl Cancel for JoinHandle<()> {
    fn cancel(&self) {
        self.abort();
    }
}

/// Scheduler backed by tokio timers; each timeout is an abortable task.
#[derive(Clone)]
pub struct TokioScheduler {
    rt: Handle,
}

impl TokioScheduler {
    /// Scheduler on the given runtime.
    pub fn new(rt: Handle) -> Self {
        Self { rt }
    }

    /// Scheduler on the runtime of the calling context.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl TimeoutScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, f: Box<dyn FnOnce() + Send + 'static>) -> TimeoutHandle {
        Box::new(self.rt.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler").finish_non_exhaustive()
    }
}
