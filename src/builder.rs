//! # ServiceBuilder: one entry point for every service flavour.
//!
//! Carries a name, a [`Config`] and a [`Telemetry`] and hands them to the
//! flavour being built:
//!
//! ```text
//! ServiceBuilder::new("ingest")
//!     .config(cfg)
//!     .telemetry(registry.telemetry().clone())
//!     ├─► .core(lifecycle)          → ServiceCore
//!     ├─► .supervised(worker)       → SupervisedService<W>
//!     ├─► .sync_messages(process)   → SyncMessageService<M, P>
//!     └─► .queued_messages(process) → QueuedMessageService<M, P>
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::messages::{Process, QueuedMessageService, SyncMessageService};
use crate::service::{Lifecycle, ServiceCore};
use crate::supervised::{SupervisedService, Worker};
use crate::telemetry::Telemetry;

/// Builder for services sharing one configuration and telemetry.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use servicevisor::{Config, ProcessFn, Service, ServiceBuilder, ServiceState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cfg = Config { queue_capacity: 16, ..Config::default() };
/// let svc = ServiceBuilder::new("audit")
///     .config(cfg)
///     .queued_messages(ProcessFn::new(|line: String| async move {
///         println!("{line}");
///         Ok(())
///     }));
///
/// assert_eq!(svc.start().await, Ok(ServiceState::Running));
/// assert_eq!(svc.submit("hello".to_string()).await, Ok(true));
/// assert_eq!(svc.stop().await, Ok(ServiceState::Terminated));
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ServiceBuilder {
    name: Arc<str>,
    cfg: Config,
    telemetry: Telemetry,
}

impl ServiceBuilder {
    /// Starts a builder for a service called `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            cfg: Config::default(),
            telemetry: Telemetry::default(),
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Replaces the telemetry (event bus and metrics).
    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Bare state machine driven by `lifecycle`.
    pub fn core(self, lifecycle: impl Lifecycle) -> ServiceCore {
        ServiceCore::with_telemetry(self.name, lifecycle, self.telemetry)
    }

    /// Supervised worker restarted after `restart_delay`.
    pub fn supervised<W: Worker>(self, worker: W) -> SupervisedService<W> {
        SupervisedService::with_telemetry(self.name, worker, self.cfg.restart_delay, self.telemetry)
    }

    /// Inline message service; honours `propagate_failures`.
    pub fn sync_messages<M, P>(self, processor: P) -> SyncMessageService<M, P>
    where
        M: Send + 'static,
        P: Process<M>,
    {
        SyncMessageService::with_telemetry(
            self.name,
            processor,
            self.cfg.propagate_failures,
            self.telemetry,
        )
    }

    /// Queued message service; honours the queue and timing settings.
    pub fn queued_messages<M, P>(self, processor: P) -> QueuedMessageService<M, P>
    where
        M: Send + 'static,
        P: Process<M>,
    {
        QueuedMessageService::with_telemetry(self.name, processor, &self.cfg, self.telemetry)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ServiceError;
    use crate::messages::ProcessFn;
    use crate::metrics::LocalMetrics;
    use crate::service::{Immediate, Service, ServiceState};

    #[tokio::test]
    async fn test_sync_messages_honours_propagation() {
        let cfg = Config {
            propagate_failures: true,
            ..Config::default()
        };
        let svc = ServiceBuilder::new("strict")
            .config(cfg)
            .sync_messages(ProcessFn::new(|_: u8| async { anyhow::bail!("rejected") }));
        svc.start().await.unwrap();

        assert!(matches!(svc.submit(1).await, Err(ServiceError::Process { .. })));
    }

    #[tokio::test]
    async fn test_telemetry_reaches_every_flavour() {
        let metrics = Arc::new(LocalMetrics::new());
        let builder = ServiceBuilder::new("svc")
            .telemetry(Telemetry::default().with_metrics(metrics.clone()));

        let core = builder.clone().core(Immediate);
        core.start().await.unwrap();
        assert_eq!(metrics.gauge_value("svc.status"), Some(2));

        let queued = ServiceBuilder::new("queue")
            .config(Config {
                poll_timeout: Duration::from_millis(10),
                ..Config::default()
            })
            .telemetry(Telemetry::default().with_metrics(metrics.clone()))
            .queued_messages(ProcessFn::new(|_: u8| async { Ok(()) }));
        assert_eq!(queued.submit(1).await, Ok(false));
        assert_eq!(metrics.counter_value("queue.skipped"), Some(1));
        assert_eq!(queued.stop().await, Ok(ServiceState::Terminated));
    }
}
