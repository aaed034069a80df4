//! # SupervisedService: one worker, restarted on failure.
//!
//! Wraps a [`ServiceCore`] whose `do_start` spawns exactly one tokio task and
//! whose `do_stop` clears `operates` and cancels the worker's token.
//!
//! ## Worker loop
//! ```text
//! on_start()                        failure ─► core.failed (start fails)
//! core.started()
//! while operates {
//!   ├─► if last_failure: on_start() (re-arm; failure here is fatal)
//!   ├─► step(child token)
//!   │     ├─ Ok          ─► loop
//!   │     ├─ Canceled    ─► restart requested? re-arm via on_stop/on_start
//!   │     │                 stopping?          break
//!   │     │                 otherwise          (interrupt) re-enter step
//!   │     ├─ Fail/panic  ─► on_stop (best effort), sleep(restart_delay), re-arm
//!   │     └─ Fatal       ─► core.failed, exit without on_stop
//! }
//! on_stop() if Running/Stopping     failure ─► core.failed (stop fails)
//! (a panicking hook counts as a failing hook)
//! core.stopped()
//! ```
//!
//! ## Rules
//! - At most one worker task per instance; instances are not restartable once terminal.
//! - Transient failures are retried without limit, after the same fixed delay each time.
//! - `restart()` never changes the visible `Running` state.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{StepError, panic_message};
use crate::events::{Event, EventKind};
use crate::service::{Completion, Lifecycle, Service, ServiceCore, ServiceState};
use crate::supervised::Worker;
use crate::telemetry::Telemetry;

const RESTART_CAUSE: &str = "cancelled for restart";

/// State shared between the service handle, its lifecycle hooks and the worker task.
struct Shared<W> {
    name: Arc<str>,
    worker: W,
    /// Run/exit signal observed by the loop.
    operates: AtomicBool,
    restart_requested: AtomicBool,
    restart_delay: Duration,
    /// Cancelled once on stop; parent of every step token.
    shutdown: CancellationToken,
    /// Token handed to the step currently running.
    step_token: Mutex<CancellationToken>,
    join: Mutex<Option<JoinHandle<()>>>,
    telemetry: Telemetry,
}

/// Lifecycle hooks plugged into the core.
struct Supervision<W> {
    shared: Arc<Shared<W>>,
}

impl<W: Worker> Lifecycle for Supervision<W> {
    fn do_start(&self, core: &ServiceCore) -> anyhow::Result<()> {
        let rt = tokio::runtime::Handle::try_current()
            .context("supervised service must be started inside a tokio runtime")?;

        self.shared.operates.store(true, Ordering::Release);
        let join = rt.spawn(Arc::clone(&self.shared).run(core.clone()));
        *self.shared.join.lock() = Some(join);
        Ok(())
    }

    fn do_stop(&self, _core: &ServiceCore) -> anyhow::Result<()> {
        self.shared.operates.store(false, Ordering::Release);
        self.shared.shutdown.cancel();
        Ok(())
    }
}

impl<W: Worker> Shared<W> {
    async fn run(self: Arc<Self>, core: ServiceCore) {
        if let Err(e) = guarded("on_start", self.worker.on_start()).await {
            core.failed(format!("{e:#}"));
            return;
        }
        if let Err(e) = core.started() {
            error!(service = %self.name, error = %e, "worker could not acknowledge start");
            return;
        }

        let mut last_failure: Option<String> = None;
        while self.operates.load(Ordering::Acquire) {
            if let Some(prev) = last_failure.take() {
                if let Err(e) = guarded("on_start", self.worker.on_start()).await {
                    self.fatal(&core, format!("re-arm failed: {e:#}"));
                    return;
                }
                debug!(service = %self.name, previous = %prev, "worker restarted after failure");
                self.telemetry.publish(
                    Event::new(EventKind::WorkerRestarting)
                        .with_service(Arc::clone(&self.name))
                        .with_reason(prev),
                );
            }

            let token = self.next_step_token();
            let res = AssertUnwindSafe(self.worker.step(token))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(StepError::Fail {
                        error: format!("step panicked: {}", panic_message(panic.as_ref())),
                    })
                });

            match res {
                Ok(()) => {}
                Err(StepError::Canceled) => {
                    if self.restart_requested.swap(false, Ordering::AcqRel) {
                        last_failure = Some(RESTART_CAUSE.to_owned());
                        self.stop_quietly().await;
                    } else if !self.operates.load(Ordering::Acquire) {
                        break;
                    }
                }
                Err(StepError::Fatal { error }) => {
                    self.fatal(&core, error);
                    return;
                }
                Err(e) => {
                    warn!(
                        service = %self.name,
                        error = %e,
                        delay = ?self.restart_delay,
                        "worker step failed; restarting"
                    );
                    self.telemetry.publish(
                        Event::new(EventKind::StepFailed)
                            .with_service(Arc::clone(&self.name))
                            .with_reason(e.to_string())
                            .with_delay(self.restart_delay),
                    );
                    last_failure = Some(e.to_string());
                    self.stop_quietly().await;
                    self.pause().await;
                }
            }
        }

        if matches!(core.state(), ServiceState::Running | ServiceState::Stopping) {
            if let Err(e) = guarded("on_stop", self.worker.on_stop()).await {
                core.failed(format!("{e:#}"));
                return;
            }
        }
        core.stopped();
    }

    /// Fresh child of the shutdown token; pre-cancelled if a restart is pending.
    fn next_step_token(&self) -> CancellationToken {
        let token = self.shutdown.child_token();
        if self.restart_requested.load(Ordering::Acquire) {
            token.cancel();
        }
        *self.step_token.lock() = token.clone();
        token
    }

    async fn stop_quietly(&self) {
        if let Err(e) = guarded("on_stop", self.worker.on_stop()).await {
            debug!(service = %self.name, error = %format!("{e:#}"), "on_stop failed during restart");
        }
    }

    /// Sleeps `restart_delay`; cut short by shutdown.
    async fn pause(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.restart_delay) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    fn fatal(&self, core: &ServiceCore, error: String) {
        error!(service = %self.name, %error, "worker loop aborted");
        self.operates.store(false, Ordering::Release);
        self.telemetry.publish(
            Event::new(EventKind::WorkerFatal)
                .with_service(Arc::clone(&self.name))
                .with_reason(error.as_str()),
        );
        core.failed(error);
    }
}

/// Awaits a worker hook, reporting a panic as an error.
async fn guarded<F>(hook: &'static str, fut: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    AssertUnwindSafe(fut).catch_unwind().await.unwrap_or_else(|panic| {
        Err(anyhow::anyhow!(
            "{hook} panicked: {}",
            panic_message(panic.as_ref())
        ))
    })
}

/// Service owning one supervised worker task.
pub struct SupervisedService<W: Worker> {
    core: ServiceCore,
    shared: Arc<Shared<W>>,
}

impl<W: Worker> SupervisedService<W> {
    /// Creates a service with default (silent) telemetry.
    pub fn new(name: impl Into<Arc<str>>, worker: W, restart_delay: Duration) -> Self {
        Self::with_telemetry(name, worker, restart_delay, Telemetry::default())
    }

    /// Creates a service publishing to `telemetry`.
    pub fn with_telemetry(
        name: impl Into<Arc<str>>,
        worker: W,
        restart_delay: Duration,
        telemetry: Telemetry,
    ) -> Self {
        let name: Arc<str> = name.into();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            name: Arc::clone(&name),
            worker,
            operates: AtomicBool::new(false),
            restart_requested: AtomicBool::new(false),
            restart_delay,
            step_token: Mutex::new(shutdown.child_token()),
            shutdown,
            join: Mutex::new(None),
            telemetry: telemetry.clone(),
        });
        let core = ServiceCore::with_telemetry(
            name,
            Supervision {
                shared: Arc::clone(&shared),
            },
            telemetry,
        );
        Self { core, shared }
    }

    /// Underlying state machine.
    pub fn core(&self) -> &ServiceCore {
        &self.core
    }

    /// The supervised worker.
    pub fn worker(&self) -> &W {
        &self.shared.worker
    }

    /// Configured pause between a failure and the restart.
    pub fn restart_delay(&self) -> Duration {
        self.shared.restart_delay
    }

    /// `true` while `Running`.
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Re-arms the worker (on_stop, on_start) without leaving `Running`.
    ///
    /// Returns `false` if the service is not running.
    pub fn restart(&self) -> bool {
        if !self.core.is_running() {
            return false;
        }
        self.shared.restart_requested.store(true, Ordering::Release);
        self.shared.step_token.lock().cancel();

        debug!(service = %self.shared.name, "restart requested");
        self.shared.telemetry.publish(
            Event::new(EventKind::RestartRequested).with_service(Arc::clone(&self.shared.name)),
        );
        true
    }

    /// Cancels the current step so the worker re-enters the loop; flags are untouched.
    pub fn interrupt(&self) {
        self.shared.step_token.lock().cancel();
    }

    /// `true` once the worker task has exited.
    pub fn is_worker_finished(&self) -> bool {
        self.shared
            .join
            .lock()
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }
}

impl<W: Worker> Service for SupervisedService<W> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn start(&self) -> Completion {
        self.core.start()
    }

    fn stop(&self) -> Completion {
        self.core.stop()
    }

    fn state(&self) -> ServiceState {
        self.core.state()
    }
}

impl<W: Worker> Drop for SupervisedService<W> {
    fn drop(&mut self) {
        if !self.core.is_terminal() {
            self.core.stop();
        }
    }
}

impl<W: Worker> fmt::Debug for SupervisedService<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedService")
            .field("name", &self.shared.name)
            .field("state", &self.core.state())
            .field("restart_delay", &self.shared.restart_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::ServiceError;
    use crate::supervised::WorkerFn;
    use crate::test_support::eventually;

    const DELAY: Duration = Duration::from_millis(10);

    #[derive(Clone, Copy, Default, PartialEq)]
    enum FirstStep {
        #[default]
        Block,
        Fail,
        Panic,
        Fatal,
    }

    #[derive(Default)]
    struct Probe {
        starts: AtomicUsize,
        stops: AtomicUsize,
        steps: AtomicUsize,
        first: FirstStep,
        fail_start: bool,
        fail_stop: bool,
        /// 1-based `on_start` call that panics; 0 never panics.
        panic_on_start: usize,
        panic_on_stop: bool,
        gate: Option<Arc<Notify>>,
    }

    impl Probe {
        fn with_first(first: FirstStep) -> Self {
            Self {
                first,
                ..Default::default()
            }
        }

        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        fn steps(&self) -> usize {
            self.steps.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Worker for Probe {
        async fn on_start(&self) -> anyhow::Result<()> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.panic_on_start {
                panic!("driver not loaded");
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_start {
                anyhow::bail!("cannot bind socket");
            }
            Ok(())
        }

        async fn step(&self, ctx: CancellationToken) -> Result<(), StepError> {
            let n = self.steps.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                match self.first {
                    FirstStep::Fail => return Err(StepError::fail("flaky upstream")),
                    FirstStep::Panic => panic!("step blew up"),
                    FirstStep::Fatal => return Err(StepError::fatal("corrupt state")),
                    FirstStep::Block => {}
                }
            }
            ctx.cancelled().await;
            Err(StepError::Canceled)
        }

        async fn on_stop(&self) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_stop {
                panic!("disk vanished");
            }
            if self.fail_stop {
                anyhow::bail!("flush failed");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_steps_until_stopped() {
        let steps = Arc::new(AtomicUsize::new(0));
        let counter = steps.clone();
        let svc = SupervisedService::new(
            "ticker",
            WorkerFn::new(move |ctx: CancellationToken| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::select! {
                        _ = ctx.cancelled() => Err(StepError::Canceled),
                        _ = tokio::time::sleep(Duration::from_millis(1)) => Ok(()),
                    }
                }
            }),
            DELAY,
        );

        assert_eq!(svc.start().await, Ok(ServiceState::Running));
        eventually(|| steps.load(Ordering::SeqCst) >= 3).await;
        assert_eq!(svc.stop().await, Ok(ServiceState::Terminated));
        eventually(|| svc.is_worker_finished()).await;
    }

    #[tokio::test]
    async fn test_failed_step_triggers_restart_cycle() {
        let svc = SupervisedService::new("flaky", Probe::with_first(FirstStep::Fail), DELAY);
        svc.start().await.unwrap();

        eventually(|| svc.worker().starts() == 2 && svc.worker().steps() == 2).await;
        assert_eq!(svc.worker().stops(), 1);
        assert_eq!(svc.state(), ServiceState::Running);

        svc.stop().await.unwrap();
        assert_eq!(svc.worker().stops(), 2);
    }

    #[tokio::test]
    async fn test_panicking_step_is_recovered() {
        let svc = SupervisedService::new("panicky", Probe::with_first(FirstStep::Panic), DELAY);
        svc.start().await.unwrap();

        eventually(|| svc.worker().starts() == 2 && svc.worker().steps() == 2).await;
        assert!(svc.is_running());
        assert_eq!(svc.stop().await, Ok(ServiceState::Terminated));
    }

    #[tokio::test]
    async fn test_fatal_step_fails_service() {
        let svc = SupervisedService::new("doomed", Probe::with_first(FirstStep::Fatal), DELAY);
        assert_eq!(svc.start().await, Ok(ServiceState::Running));

        let err = svc.core().stop_completion().await.unwrap_err();
        assert!(err.to_string().contains("corrupt state"));
        assert_eq!(svc.state(), ServiceState::Failed);
        assert_eq!(svc.worker().stops(), 0);
    }

    #[tokio::test]
    async fn test_on_start_failure_fails_start() {
        let probe = Probe {
            fail_start: true,
            ..Default::default()
        };
        let svc = SupervisedService::new("unbindable", probe, DELAY);

        let err = svc.start().await.unwrap_err();
        assert!(err.to_string().contains("cannot bind socket"));
        let err = svc.stop().await.unwrap_err();
        assert!(matches!(err, ServiceError::FailedToStart { .. }));
        assert!(err.to_string().contains("service failed to start"));
        assert_eq!(svc.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_panicking_on_start_fails_start() {
        let probe = Probe {
            panic_on_start: 1,
            ..Default::default()
        };
        let svc = SupervisedService::new("no-driver", probe, DELAY);

        let out = svc.start().wait_timeout(Duration::from_secs(1)).await;
        let err = out.expect("start resolves").unwrap_err();
        assert!(err.to_string().contains("on_start panicked: driver not loaded"));
        let err = svc.stop().await.unwrap_err();
        assert!(matches!(err, ServiceError::FailedToStart { .. }));
        assert_eq!(svc.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_panicking_rearm_is_fatal() {
        let probe = Probe {
            first: FirstStep::Fail,
            panic_on_start: 2,
            ..Default::default()
        };
        let svc = SupervisedService::new("fragile", probe, DELAY);
        assert_eq!(svc.start().await, Ok(ServiceState::Running));

        let out = svc.core().stop_completion().wait_timeout(Duration::from_secs(1)).await;
        let err = out.expect("stop resolves").unwrap_err();
        assert!(err.to_string().contains("on_start panicked"));
        assert_eq!(svc.state(), ServiceState::Failed);
        eventually(|| svc.is_worker_finished()).await;
    }

    #[tokio::test]
    async fn test_panicking_on_stop_fails_stop() {
        let probe = Probe {
            panic_on_stop: true,
            ..Default::default()
        };
        let svc = SupervisedService::new("vanishing", probe, DELAY);
        svc.start().await.unwrap();

        let out = svc.stop().wait_timeout(Duration::from_secs(1)).await;
        let err = out.expect("stop resolves").unwrap_err();
        assert!(err.to_string().contains("on_stop panicked: disk vanished"));
        assert_eq!(svc.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_panicking_on_stop_during_restart_is_tolerated() {
        let probe = Probe {
            first: FirstStep::Fail,
            panic_on_stop: true,
            ..Default::default()
        };
        let svc = SupervisedService::new("sloppy", probe, DELAY);
        svc.start().await.unwrap();

        eventually(|| svc.worker().starts() == 2 && svc.worker().steps() == 2).await;
        assert!(svc.is_running());
    }

    #[tokio::test]
    async fn test_on_stop_failure_fails_stop() {
        let probe = Probe {
            fail_stop: true,
            ..Default::default()
        };
        let svc = SupervisedService::new("leaky", probe, DELAY);
        svc.start().await.unwrap();

        let err = svc.stop().await.unwrap_err();
        assert!(err.to_string().contains("flush failed"));
        assert_eq!(svc.core().start_completion().peek(), Some(Ok(ServiceState::Running)));
        assert_eq!(svc.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_restart_rearms_and_stays_running() {
        let svc = SupervisedService::new("rearm", Probe::default(), DELAY);
        svc.start().await.unwrap();
        eventually(|| svc.worker().steps() == 1).await;

        assert!(svc.restart());
        eventually(|| svc.worker().steps() == 2).await;
        assert_eq!(svc.worker().starts(), 2);
        assert_eq!(svc.worker().stops(), 1);
        assert_eq!(svc.state(), ServiceState::Running);

        svc.stop().await.unwrap();
        assert!(!svc.restart());
    }

    #[tokio::test]
    async fn test_interrupt_reenters_step_without_rearm() {
        let svc = SupervisedService::new("poller", Probe::default(), DELAY);
        svc.start().await.unwrap();
        eventually(|| svc.worker().steps() == 1).await;

        svc.interrupt();
        eventually(|| svc.worker().steps() == 2).await;
        assert_eq!(svc.worker().starts(), 1);
        assert_eq!(svc.worker().stops(), 0);
        assert!(svc.is_running());
    }

    #[tokio::test]
    async fn test_stop_during_start_is_deferred() {
        let gate = Arc::new(Notify::new());
        let probe = Probe {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let svc = SupervisedService::new("slow-boot", probe, DELAY);

        let start = svc.start();
        let stop = svc.stop();
        assert_eq!(svc.state(), ServiceState::Starting);

        gate.notify_one();
        assert_eq!(stop.await, Ok(ServiceState::Terminated));
        assert_eq!(start.await, Ok(ServiceState::Terminated));
        assert_eq!(svc.worker().steps(), 0);
        assert_eq!(svc.worker().stops(), 1);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let svc = SupervisedService::new("orphan", Probe::default(), DELAY);
        let start = svc.start();
        assert!(matches!(start.peek(), Some(Err(ServiceError::Failed { .. }))));
        assert_eq!(svc.state(), ServiceState::Failed);
    }
}
