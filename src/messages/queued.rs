//! # QueuedMessageService: accept now, process on a supervised worker.
//!
//! Built on a [`SupervisedService`] whose worker drains a [`MessageQueue`]:
//!
//! ```text
//! submit(msg) ──► queue ──► Drain::step
//!                             ├─ poll(poll_timeout) or cancelled
//!                             ├─ process(first)
//!                             └─ process the rest until empty or cancelled
//! ```
//!
//! ## Submit policies
//! - **Blocking** (default): timed enqueue attempts (`offer_timeout` each)
//!   until one succeeds or the service is no longer running.
//! - **Skip**: one non-blocking attempt; a full queue rejects the message.
//!
//! After enqueueing, the running check is repeated; if the service stopped in
//! the meantime the message is withdrawn. If the drain worker already took it,
//! the message is processed and `submit` still reports `true`: delivery is
//! attempted at least once, not strictly bounded by the stop.
//!
//! Processing errors and panics are logged and counted; the drain keeps going.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ServiceError, StepError, panic_message};
use crate::events::{Event, EventKind};
use crate::messages::contract::Counters;
use crate::messages::queue::MessageQueue;
use crate::messages::{MessageService, MessageStats, Process};
use crate::service::{Completion, Service, ServiceCore, ServiceState};
use crate::supervised::{SupervisedService, Worker};
use crate::telemetry::Telemetry;

/// Worker draining the queue into the processor.
struct Drain<M, P> {
    name: Arc<str>,
    queue: Arc<MessageQueue<M>>,
    processor: P,
    poll_timeout: Duration,
    counters: Arc<Counters>,
    telemetry: Telemetry,
}

impl<M, P> Drain<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    async fn handle(&self, msg: M) {
        let error = match AssertUnwindSafe(self.processor.process(msg))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {
                self.counters.processed.inc();
                return;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("processor panicked: {}", panic_message(panic.as_ref())),
        };

        self.counters.failed.inc();
        warn!(service = %self.name, %error, "message processing failed");
        self.telemetry.publish(
            Event::new(EventKind::ProcessFailed)
                .with_service(Arc::clone(&self.name))
                .with_reason(error),
        );
    }
}

#[async_trait]
impl<M, P> Worker for Drain<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    async fn step(&self, ctx: CancellationToken) -> Result<(), StepError> {
        let first = tokio::select! {
            _ = ctx.cancelled() => return Err(StepError::Canceled),
            msg = self.queue.poll(self.poll_timeout) => msg,
        };
        let Some(first) = first else {
            return Ok(());
        };

        self.handle(first).await;
        while !ctx.is_cancelled() {
            let Some(msg) = self.queue.try_pop() else {
                break;
            };
            self.handle(msg).await;
        }
        Ok(())
    }
}

/// Message service backed by a queue and one supervised drain worker.
pub struct QueuedMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    supervised: SupervisedService<Drain<M, P>>,
    queue: Arc<MessageQueue<M>>,
    skip_on_full: bool,
    offer_timeout: Duration,
    counters: Arc<Counters>,
}

impl<M, P> QueuedMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    /// Creates a service from `cfg` with default (silent) telemetry.
    ///
    /// Uses `queue_capacity`, `skip_on_full`, `poll_timeout`, `offer_timeout`
    /// and `restart_delay`.
    pub fn new(name: impl Into<Arc<str>>, processor: P, cfg: &Config) -> Self {
        Self::with_telemetry(name, processor, cfg, Telemetry::default())
    }

    /// Creates a service from `cfg` publishing to `telemetry`.
    pub fn with_telemetry(
        name: impl Into<Arc<str>>,
        processor: P,
        cfg: &Config,
        telemetry: Telemetry,
    ) -> Self {
        let name: Arc<str> = name.into();
        let queue = Arc::new(MessageQueue::new(cfg.queue_limit()));
        let counters = Arc::new(Counters::new(&name, telemetry.metrics().as_ref()));

        let drain = Drain {
            name: Arc::clone(&name),
            queue: Arc::clone(&queue),
            processor,
            poll_timeout: cfg.poll_timeout,
            counters: Arc::clone(&counters),
            telemetry: telemetry.clone(),
        };
        Self {
            supervised: SupervisedService::with_telemetry(name, drain, cfg.restart_delay, telemetry),
            queue,
            skip_on_full: cfg.skip_on_full,
            offer_timeout: cfg.offer_timeout,
            counters,
        }
    }

    /// Underlying state machine.
    pub fn core(&self) -> &ServiceCore {
        self.supervised.core()
    }

    /// `true` while `Running`.
    pub fn is_running(&self) -> bool {
        self.supervised.is_running()
    }

    /// Re-arms the drain worker; see [`SupervisedService::restart`].
    pub fn restart(&self) -> bool {
        self.supervised.restart()
    }

    /// Wakes the drain worker out of its current poll.
    pub fn interrupt(&self) {
        self.supervised.interrupt();
    }

    /// Messages waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue bound (`None` = unbounded).
    pub fn capacity(&self) -> Option<usize> {
        self.queue.capacity()
    }

    /// Enqueues `msg` according to the submit policy.
    pub async fn submit(&self, msg: M) -> Result<bool, ServiceError> {
        if !self.is_running() {
            self.skip("service not running");
            return Ok(false);
        }
        self.counters.submitted.inc();

        let ticket = if self.skip_on_full {
            match self.queue.try_push(msg) {
                Ok(ticket) => ticket,
                Err(_) => {
                    self.skip("queue full");
                    return Ok(false);
                }
            }
        } else {
            let mut msg = msg;
            loop {
                match self.queue.push_timeout(msg, self.offer_timeout).await {
                    Ok(ticket) => break ticket,
                    Err(back) if self.is_running() => msg = back,
                    Err(_) => {
                        self.skip("service stopped while waiting for queue space");
                        return Ok(false);
                    }
                }
            }
        };

        Ok(self.settle(ticket))
    }

    /// Post-enqueue check: withdraws `ticket` if the service stopped meanwhile.
    ///
    /// Returns `true` when the message stays accepted, including when the drain
    /// worker already took it.
    fn settle(&self, ticket: u64) -> bool {
        if !self.is_running() && self.queue.remove(ticket) {
            self.skip("service stopped after enqueue");
            return false;
        }
        true
    }

    /// Snapshot of the submission counters.
    pub fn stats(&self) -> MessageStats {
        self.counters.snapshot()
    }

    fn skip(&self, reason: &'static str) {
        self.counters.skipped.inc();
        debug!(service = %self.supervised.name(), reason, "message skipped");
        self.core().telemetry().publish(
            Event::new(EventKind::MessageSkipped)
                .with_service(self.supervised.name())
                .with_reason(reason),
        );
    }
}

impl<M, P> Service for QueuedMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    fn name(&self) -> &str {
        self.supervised.name()
    }

    fn start(&self) -> Completion {
        self.supervised.start()
    }

    fn stop(&self) -> Completion {
        self.supervised.stop()
    }

    fn state(&self) -> ServiceState {
        self.supervised.state()
    }
}

#[async_trait]
impl<M, P> MessageService<M> for QueuedMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    async fn submit(&self, msg: M) -> Result<bool, ServiceError> {
        QueuedMessageService::submit(self, msg).await
    }

    fn stats(&self) -> MessageStats {
        QueuedMessageService::stats(self)
    }
}

impl<M, P> fmt::Debug for QueuedMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedMessageService")
            .field("name", &self.supervised.name())
            .field("state", &self.supervised.state())
            .field("pending", &self.queue.len())
            .field("capacity", &self.queue.capacity())
            .field("skip_on_full", &self.skip_on_full)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{Notify, mpsc};

    use super::*;
    use crate::messages::ProcessFn;
    use crate::test_support::eventually;

    fn config(capacity: usize, skip_on_full: bool) -> Config {
        Config {
            restart_delay: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(20),
            offer_timeout: Duration::from_millis(10),
            queue_capacity: capacity,
            skip_on_full,
            ..Config::default()
        }
    }

    /// Reports every message on `seen`; holds "A" until `gate` is notified.
    fn recorder(
        seen: mpsc::UnboundedSender<&'static str>,
        gate: Arc<Notify>,
    ) -> impl Process<&'static str> {
        ProcessFn::new(move |msg: &'static str| {
            let seen = seen.clone();
            let gate = gate.clone();
            async move {
                let _ = seen.send(msg);
                if msg == "A" {
                    gate.notified().await;
                }
                if msg == "bad" {
                    anyhow::bail!("unparseable payload");
                }
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_skip_policy_rejects_when_full() {
        let (tx, mut seen) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let svc = QueuedMessageService::new("skip", recorder(tx, gate.clone()), &config(1, true));
        svc.start().await.unwrap();

        assert_eq!(svc.submit("A").await, Ok(true));
        assert_eq!(seen.recv().await, Some("A"));

        assert_eq!(svc.submit("B").await, Ok(true));
        assert_eq!(svc.submit("C").await, Ok(false));
        assert_eq!(svc.stats().skipped, 1);
        assert_eq!(svc.pending(), 1);

        gate.notify_one();
        assert_eq!(seen.recv().await, Some("B"));
        eventually(|| svc.stats().processed == 2).await;

        svc.stop().await.unwrap();
        assert_eq!(
            svc.stats(),
            MessageStats {
                submitted: 3,
                skipped: 1,
                processed: 2,
                failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_submit_before_start_never_processes() {
        let (tx, mut seen) = mpsc::unbounded_channel();
        let svc = QueuedMessageService::new("idle", recorder(tx, Arc::new(Notify::new())), &config(0, false));

        assert_eq!(svc.submit("x").await, Ok(false));
        assert_eq!(svc.pending(), 0);
        assert_eq!(svc.stats().skipped, 1);
        assert_eq!(svc.stats().submitted, 0);

        svc.start().await.unwrap();
        svc.stop().await.unwrap();
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_blocking_policy_waits_for_space() {
        let (tx, mut seen) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let svc = Arc::new(QueuedMessageService::new(
            "blocking",
            recorder(tx, gate.clone()),
            &config(1, false),
        ));
        svc.start().await.unwrap();

        assert_eq!(svc.submit("A").await, Ok(true));
        assert_eq!(seen.recv().await, Some("A"));
        assert_eq!(svc.submit("B").await, Ok(true));

        let blocked = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.submit("C").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!blocked.is_finished());

        gate.notify_one();
        assert_eq!(blocked.await.unwrap(), Ok(true));
        eventually(|| svc.stats().processed == 3).await;
        assert_eq!(svc.stats().skipped, 0);
    }

    #[tokio::test]
    async fn test_blocking_submit_gives_up_when_stopped() {
        let (tx, mut seen) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let svc = Arc::new(QueuedMessageService::new(
            "draining",
            recorder(tx, gate.clone()),
            &config(1, false),
        ));
        svc.start().await.unwrap();

        svc.submit("A").await.unwrap();
        assert_eq!(seen.recv().await, Some("A"));
        svc.submit("B").await.unwrap();

        let blocked = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.submit("C").await })
        };
        let stop = svc.stop();
        assert_eq!(svc.state(), ServiceState::Stopping);
        assert_eq!(blocked.await.unwrap(), Ok(false));
        assert_eq!(svc.stats().skipped, 1);

        gate.notify_one();
        assert_eq!(stop.await, Ok(ServiceState::Terminated));
    }

    #[tokio::test]
    async fn test_processing_errors_do_not_stop_the_drain() {
        let (tx, mut seen) = mpsc::unbounded_channel();
        let svc = QueuedMessageService::new("lenient", recorder(tx, Arc::new(Notify::new())), &config(0, false));
        svc.start().await.unwrap();

        assert_eq!(svc.submit("bad").await, Ok(true));
        assert_eq!(svc.submit("good").await, Ok(true));
        assert_eq!(seen.recv().await, Some("bad"));
        assert_eq!(seen.recv().await, Some("good"));
        eventually(|| svc.stats().processed == 1 && svc.stats().failed == 1).await;

        assert!(svc.is_running());
        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_service_stops_promptly() {
        let (tx, _seen) = mpsc::unbounded_channel();
        let svc = QueuedMessageService::new("quiet", recorder(tx, Arc::new(Notify::new())), &config(0, false));
        svc.start().await.unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(1), svc.stop()).await;
        assert_eq!(stopped, Ok(Ok(ServiceState::Terminated)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_message_enqueued_after_stop_is_withdrawn() {
        let (tx, mut seen) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let cfg = Config {
            offer_timeout: Duration::from_secs(5),
            ..config(1, false)
        };
        let svc = Arc::new(QueuedMessageService::new("late", recorder(tx, gate.clone()), &cfg));
        svc.start().await.unwrap();

        svc.submit("A").await.unwrap();
        assert_eq!(seen.recv().await, Some("A"));
        svc.submit("B").await.unwrap();

        let blocked = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.submit("C").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!blocked.is_finished());

        let stop = svc.stop();
        assert_eq!(svc.queue.try_pop(), Some("B"));
        assert_eq!(blocked.await.unwrap(), Ok(false));
        assert_eq!(svc.pending(), 0);
        assert_eq!(svc.stats().skipped, 1);
        assert_eq!(svc.stats().submitted, 3);

        gate.notify_one();
        assert_eq!(stop.await, Ok(ServiceState::Terminated));
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settle_keeps_message_already_taken_by_drain() {
        let (tx, _seen) = mpsc::unbounded_channel();
        let svc = QueuedMessageService::new("raced", recorder(tx, Arc::new(Notify::new())), &config(0, false));
        assert!(!svc.is_running());

        let taken = svc.queue.try_push("first").unwrap();
        assert_eq!(svc.queue.try_pop(), Some("first"));
        assert!(svc.settle(taken));
        assert_eq!(svc.stats().skipped, 0);

        let queued = svc.queue.try_push("second").unwrap();
        assert!(!svc.settle(queued));
        assert_eq!(svc.pending(), 0);
        assert_eq!(svc.stats().skipped, 1);
    }
}
