//! # UnitOfWork: one request/response exchange with an optional timeout.
//!
//! ```text
//! New ──resume()──► Running ──complete()──► Terminated
//!  │                   │
//!  └──────fail(cause)──┴──────────────────► Failed
//! ```
//!
//! ## Rules
//! - Each terminal state is entered at most once; the callback fires exactly
//!   once, on the call that performed the transition.
//! - Completion cancels the attached timeout. A timeout that fires anyway hits
//!   the state guard and returns `false`.
//! - The callback runs after the lock is released, so it may call back into
//!   the unit. Its errors and panics are logged, never propagated.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{WorkError, panic_message};
use crate::work::{TimeoutHandle, TimeoutScheduler};

/// State of a [`UnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkState {
    /// Created, not yet resumed.
    New,
    /// Waiting for its response.
    Running,
    /// Completed normally.
    Terminated,
    /// Failed or timed out.
    Failed,
}

impl WorkState {
    /// `true` for `Terminated` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkState::Terminated | WorkState::Failed)
    }
}

type Callback = Box<dyn FnOnce(&Result<(), WorkError>) -> anyhow::Result<()> + Send>;

struct Inner {
    state: WorkState,
    timeout: Option<TimeoutHandle>,
    failure: Option<WorkError>,
    callback: Option<Callback>,
}

/// One logical exchange with an exactly-once completion callback.
///
/// # Example
/// ```
/// use servicevisor::{UnitOfWork, WorkState};
///
/// let unit = UnitOfWork::new("req-1", |outcome| {
///     assert!(outcome.is_ok());
///     Ok(())
/// });
/// assert!(unit.resume());
/// assert!(unit.complete());
/// assert!(!unit.complete());
/// assert_eq!(unit.state(), WorkState::Terminated);
/// ```
pub struct UnitOfWork {
    label: Arc<str>,
    inner: Mutex<Inner>,
}

impl UnitOfWork {
    /// Creates a unit in `New` with its completion callback.
    pub fn new<F>(label: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: FnOnce(&Result<(), WorkError>) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            label: label.into(),
            inner: Mutex::new(Inner {
                state: WorkState::New,
                timeout: None,
                failure: None,
                callback: Some(Box::new(callback)),
            }),
        }
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state.
    pub fn state(&self) -> WorkState {
        self.inner.lock().state
    }

    /// Captured failure cause; set only in `Failed`.
    pub fn failure(&self) -> Option<WorkError> {
        self.inner.lock().failure.clone()
    }

    /// `New → Running`. Returns `false` in any other state.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != WorkState::New {
            return false;
        }
        inner.state = WorkState::Running;
        true
    }

    /// `Running → Terminated`. Returns `false` if this call did not perform the transition.
    pub fn complete(&self) -> bool {
        self.finish(Ok(()))
    }

    /// `New | Running → Failed`. Returns `false` if the unit was already terminal.
    pub fn fail(&self, cause: WorkError) -> bool {
        self.finish(Err(cause))
    }

    /// Attaches a timeout handle, cancelling the previous one.
    ///
    /// If the unit is already terminal the new handle is cancelled right away.
    pub fn set_timeout_task(&self, handle: TimeoutHandle) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            handle.cancel();
            return;
        }
        if let Some(prev) = inner.timeout.replace(handle) {
            prev.cancel();
        }
    }

    /// Schedules a timeout failing the unit with [`WorkError::Timeout`] after `after`.
    ///
    /// The scheduled closure holds a weak reference; a dropped unit is never revived.
    pub fn arm_timeout(self: &Arc<Self>, scheduler: &dyn TimeoutScheduler, after: Duration) {
        let unit = Arc::downgrade(self);
        let handle = scheduler.schedule(
            after,
            Box::new(move || {
                if let Some(unit) = unit.upgrade() {
                    if !unit.fail(WorkError::Timeout { after }) {
                        debug!(unit = %unit.label, "timeout fired after completion");
                    }
                }
            }),
        );
        self.set_timeout_task(handle);
    }

    fn finish(&self, outcome: Result<(), WorkError>) -> bool {
        let callback = {
            let mut inner = self.inner.lock();
            let allowed = match outcome {
                Ok(()) => inner.state == WorkState::Running,
                Err(_) => !inner.state.is_terminal(),
            };
            if !allowed {
                return false;
            }
            if let Some(timeout) = inner.timeout.take() {
                timeout.cancel();
            }
            match &outcome {
                Ok(()) => inner.state = WorkState::Terminated,
                Err(cause) => {
                    inner.state = WorkState::Failed;
                    inner.failure = Some(cause.clone());
                }
            }
            inner.callback.take()
        };

        if let Some(callback) = callback {
            match catch_unwind(AssertUnwindSafe(|| callback(&outcome))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(unit = %self.label, error = %format!("{e:#}"), "completion callback failed");
                }
                Err(panic) => {
                    error!(
                        unit = %self.label,
                        panic = %panic_message(panic.as_ref()),
                        "completion callback panicked"
                    );
                }
            }
        }
        true
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("UnitOfWork")
            .field("label", &self.label)
            .field("state", &inner.state)
            .field("failure", &inner.failure)
            .field("timeout_armed", &inner.timeout.is_some())
            .finish()
    }
}
