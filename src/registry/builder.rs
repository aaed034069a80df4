//! # RegistryBuilder: a registry wired to an event bus and subscribers.
//!
//! ```text
//! services ── publish ──► Bus ──► listener task ──► SubscriberSet ──► sub.on_event()
//!                                     ▲
//!               ServiceRegistry::shutdown_all() closes it after the final event
//! ```
//!
//! The listener forwards every event it has already received before it exits,
//! then waits for the subscriber workers to drain their queues.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::events::Bus;
use crate::metrics::{MetricsRegistry, NoopMetrics};
use crate::registry::ServiceRegistry;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::telemetry::Telemetry;

/// Builder for a [`ServiceRegistry`] wired to an event bus and subscribers.
pub struct RegistryBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    metrics: Arc<dyn MetricsRegistry>,
}

impl RegistryBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Sets event subscribers.
    ///
    /// Each one gets a dedicated worker and a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the metrics registry handed to services built from this registry's telemetry.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Builds the registry. Must be called inside a tokio runtime.
    ///
    /// Creates the bus, spawns the subscriber workers and the listener
    /// forwarding bus events to them.
    pub fn build(self) -> Arc<ServiceRegistry> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = (!self.subscribers.is_empty()).then(|| {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            let close = CancellationToken::new();
            (close.clone(), spawn_listener(&bus, subs, close))
        });

        let telemetry = Telemetry::new(Some(bus), self.metrics);
        let registry = ServiceRegistry::new(telemetry, self.cfg.shutdown_grace());
        Arc::new(match listener {
            Some((close, join)) => registry.with_listener(close, join),
            None => registry,
        })
    }
}

/// Forwards bus events to the subscriber set until `close` fires or the bus closes.
fn spawn_listener(bus: &Bus, subs: SubscriberSet, close: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => subs.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = close.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => subs.emit(&ev),
                            Err(TryRecvError::Lagged(skipped)) => {
                                warn!(skipped, "subscriber listener lagged behind the bus");
                            }
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        subs.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::events::{Event, EventKind};
    use crate::service::{Immediate, ServiceCore};

    struct Forward(mpsc::UnboundedSender<EventKind>);

    #[async_trait]
    impl Subscribe for Forward {
        async fn on_event(&self, ev: &Event) {
            let _ = self.0.send(ev.kind);
        }

        fn name(&self) -> &'static str {
            "forward"
        }
    }

    #[tokio::test]
    async fn test_services_share_the_registry_bus() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = RegistryBuilder::new(Config::default())
            .with_subscribers(vec![Arc::new(Forward(tx))])
            .build();

        let core = Arc::new(ServiceCore::with_telemetry(
            "api",
            Immediate,
            registry.telemetry().clone(),
        ));
        core.start().await.unwrap();
        registry.add_shutdown_hook(core).await.unwrap();
        registry.shutdown().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(kind) = rx.try_recv() {
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::ServiceStarting,
                EventKind::ServiceRunning,
                EventKind::ServiceRegistered,
                EventKind::ShutdownRequested,
                EventKind::ServiceStopping,
                EventKind::ServiceTerminated,
                EventKind::AllStoppedWithin,
            ]
        );
    }

    struct Slow(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Slow {
        async fn on_event(&self, _ev: &Event) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_subscribers_to_drain() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let registry = RegistryBuilder::new(Config::default())
            .with_subscribers(vec![Arc::new(Slow(delivered.clone()))])
            .build();

        for name in ["a", "b"] {
            let core = Arc::new(ServiceCore::with_telemetry(
                name,
                Immediate,
                registry.telemetry().clone(),
            ));
            core.start().await.unwrap();
            registry.add_shutdown_hook(core).await.unwrap();
        }
        registry.shutdown().await.unwrap();

        // 2 x (starting, running, registered, stopping, terminated) + requested + all stopped
        assert_eq!(delivered.load(Ordering::SeqCst), 12);
        assert!(registry.shutdown().await.is_ok());
    }
}
