//! # ServiceCore: the lifecycle state machine.
//!
//! [`ServiceCore`] guards a [`ServiceState`] and two one-shot completions
//! (start and stop). Concrete services plug in through [`Lifecycle`]:
//! `start()`/`stop()` run the transition under the instance lock, release it,
//! then invoke the hook. Hooks acknowledge with [`started`](ServiceCore::started),
//! [`stopped`](ServiceCore::stopped) or [`failed`](ServiceCore::failed), either
//! inline or later from another task.
//!
//! ## Transitions
//! ```text
//! start():  New ──► Starting ──► do_start()        (any other state: same future)
//! started(): Starting ──► Running ──► resolve start (or run the deferred stop)
//! stop():   New ──► Terminated                    (nothing to stop)
//!           Starting ──► deferred_stop = true      (stop after started())
//!           Running ──► Stopping ──► do_stop()
//! stopped(): * ──► Terminated, resolve both        (Failed stays Failed)
//! failed():  * ──► Failed
//!             before Running: start = Err(cause), stop = Err(failed to start)
//!             otherwise:      stop  = Err(cause)
//! ```
//!
//! ## Rules
//! - Writes happen only under the instance lock; the atomic snapshot serves
//!   lock-free reads (`state`, `is_running`, `is_stopping`).
//! - Each completion resolves at most once; redundant calls are safe.
//! - Hooks never run while the lock is held.

use std::fmt::{self, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::ServiceError;
use crate::events::Event;
use crate::metrics::Gauge;
use crate::service::completion::{Completer, Completion};
use crate::service::ServiceState;
use crate::telemetry::Telemetry;

/// Start/stop hooks of a concrete service.
///
/// Errors returned here are routed to [`ServiceCore::failed`].
pub trait Lifecycle: Send + Sync + 'static {
    /// Begins initialization; must eventually lead to `started()` or `failed()`.
    fn do_start(&self, core: &ServiceCore) -> anyhow::Result<()>;

    /// Begins teardown; must eventually lead to `stopped()` or `failed()`.
    fn do_stop(&self, core: &ServiceCore) -> anyhow::Result<()>;
}

/// Lifecycle with nothing to initialize or tear down: acknowledges inline.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl Lifecycle for Immediate {
    fn do_start(&self, core: &ServiceCore) -> anyhow::Result<()> {
        core.started()?;
        Ok(())
    }

    fn do_stop(&self, core: &ServiceCore) -> anyhow::Result<()> {
        core.stopped();
        Ok(())
    }
}

/// Lock-guarded part of the state machine.
#[derive(Default)]
struct Transitions {
    deferred_stop: bool,
}

struct Inner {
    name: Arc<str>,
    /// Snapshot of the current state; written only while `transitions` is held.
    state: AtomicU8,
    transitions: Mutex<Transitions>,
    start_done: Completer,
    stop_done: Completer,
    lifecycle: Box<dyn Lifecycle>,
    telemetry: Telemetry,
    status: Arc<dyn Gauge>,
}

/// Shared handle to a service state machine. Cheap to clone.
#[derive(Clone)]
pub struct ServiceCore {
    inner: Arc<Inner>,
}

impl ServiceCore {
    /// Creates a core with default (silent) telemetry.
    pub fn new(name: impl Into<Arc<str>>, lifecycle: impl Lifecycle) -> Self {
        Self::with_telemetry(name, lifecycle, Telemetry::default())
    }

    /// Creates a core publishing transitions to `telemetry`.
    pub fn with_telemetry(
        name: impl Into<Arc<str>>,
        lifecycle: impl Lifecycle,
        telemetry: Telemetry,
    ) -> Self {
        let name: Arc<str> = name.into();
        let status = telemetry.metrics().gauge(&format!("{name}.status"));
        status.set(i64::from(ServiceState::New.code()));

        Self {
            inner: Arc::new(Inner {
                start_done: Completer::new(Arc::clone(&name)),
                stop_done: Completer::new(Arc::clone(&name)),
                name,
                state: AtomicU8::new(ServiceState::New.code()),
                transitions: Mutex::new(Transitions::default()),
                lifecycle: Box::new(lifecycle),
                telemetry,
                status,
            }),
        }
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Telemetry this core publishes to.
    pub fn telemetry(&self) -> &Telemetry {
        &self.inner.telemetry
    }

    /// Current state (lock-free snapshot).
    #[inline]
    pub fn state(&self) -> ServiceState {
        ServiceState::from_code(self.inner.state.load(Ordering::Acquire))
    }

    /// `true` while `Running`.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// `true` while a stop is in progress.
    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.state().is_stopping()
    }

    /// `true` once `Terminated` or `Failed`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Handle to the start completion without triggering a transition.
    pub fn start_completion(&self) -> Completion {
        self.inner.start_done.handle()
    }

    /// Handle to the stop completion without triggering a transition.
    pub fn stop_completion(&self) -> Completion {
        self.inner.stop_done.handle()
    }

    /// Starts the service if it is `New`; otherwise returns the existing start completion.
    pub fn start(&self) -> Completion {
        {
            let mut t = self.inner.transitions.lock();
            if self.state() != ServiceState::New {
                return self.inner.start_done.handle();
            }
            self.transition(&mut t, ServiceState::Starting, None);
        }

        if let Err(e) = self.inner.lifecycle.do_start(self) {
            self.failed(format!("{e:#}"));
        }
        self.inner.start_done.handle()
    }

    /// Stops the service.
    ///
    /// - `New`: terminates immediately.
    /// - `Starting`: records a deferred stop, executed right after `started()`.
    /// - `Running`: moves to `Stopping` and invokes `do_stop`.
    /// - otherwise: returns the existing stop completion.
    pub fn stop(&self) -> Completion {
        let invoke = {
            let mut t = self.inner.transitions.lock();
            match self.state() {
                ServiceState::New => {
                    self.transition(&mut t, ServiceState::Terminated, None);
                    self.inner.start_done.complete(Ok(ServiceState::Terminated));
                    self.inner.stop_done.complete(Ok(ServiceState::Terminated));
                    false
                }
                ServiceState::Starting => {
                    if !t.deferred_stop {
                        debug!(service = %self.inner.name, "stop deferred until start completes");
                        t.deferred_stop = true;
                    }
                    false
                }
                ServiceState::Running => {
                    self.transition(&mut t, ServiceState::Stopping, None);
                    true
                }
                _ => false,
            }
        };

        if invoke {
            if let Err(e) = self.inner.lifecycle.do_stop(self) {
                self.failed(format!("{e:#}"));
            }
        }
        self.inner.stop_done.handle()
    }

    /// Acknowledges successful initialization.
    ///
    /// Fails with [`ServiceError::IllegalState`] unless the service is `Starting`.
    pub fn started(&self) -> Result<(), ServiceError> {
        let deferred = {
            let mut t = self.inner.transitions.lock();
            let actual = self.state();
            if actual != ServiceState::Starting {
                return Err(ServiceError::IllegalState {
                    service: self.inner.name.to_string(),
                    expected: ServiceState::Starting,
                    actual,
                });
            }
            self.transition(&mut t, ServiceState::Running, None);
            t.deferred_stop
        };

        if deferred {
            debug!(service = %self.inner.name, "running deferred stop");
            self.stop();
        } else {
            self.inner.start_done.complete(Ok(ServiceState::Running));
        }
        Ok(())
    }

    /// Acknowledges completed teardown; resolves both completions with `Terminated`.
    pub fn stopped(&self) {
        let mut t = self.inner.transitions.lock();
        if self.state() == ServiceState::Failed {
            debug!(service = %self.inner.name, "stopped() after failure ignored");
            return;
        }
        self.transition(&mut t, ServiceState::Terminated, None);
        self.inner.start_done.complete(Ok(ServiceState::Terminated));
        self.inner.stop_done.complete(Ok(ServiceState::Terminated));
    }

    /// Moves the service to `Failed` and fails the pending completions.
    pub fn failed(&self, cause: impl Display) {
        let error = cause.to_string();
        let mut t = self.inner.transitions.lock();
        let prev = self.state();
        if prev == ServiceState::Failed {
            return;
        }
        self.transition(&mut t, ServiceState::Failed, Some(&error));

        let service = self.inner.name.to_string();
        if prev < ServiceState::Running {
            error!(service = %service, %error, "service failed to start");
            self.inner.start_done.complete(Err(ServiceError::Failed {
                service: service.clone(),
                error: error.clone(),
            }));
            self.inner
                .stop_done
                .complete(Err(ServiceError::FailedToStart { service, error }));
        } else {
            error!(service = %service, %error, from = %prev, "service failed");
            self.inner
                .stop_done
                .complete(Err(ServiceError::Failed { service, error }));
        }
    }

    /// Writes the new state. `_held` proves the transition lock is taken.
    fn transition(&self, _held: &mut Transitions, to: ServiceState, reason: Option<&str>) {
        let from = ServiceState::from_code(self.inner.state.swap(to.code(), Ordering::AcqRel));
        self.inner.status.set(i64::from(to.code()));
        debug!(service = %self.inner.name, %from, %to, "service transition");

        if let Some(mut ev) = Event::transition(&self.inner.name, to) {
            if let Some(reason) = reason {
                ev = ev.with_reason(reason);
            }
            self.inner.telemetry.publish(ev);
        }
    }
}

impl fmt::Debug for ServiceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCore")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
