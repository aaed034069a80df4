//! # ServiceRegistry: named services shut down together.
//!
//! The registry is an explicit value owned by whatever owns process lifetime
//! (usually `main`), not a global. Services register under their unique name
//! and are stopped together by [`ServiceRegistry::shutdown_all`].
//!
//! ## Shutdown
//! ```text
//! shutdown_all(timeout)
//!   ├─► publish ShutdownRequested
//!   ├─► stop() every registered service (all requested before any wait)
//!   ├─► wait for every stop completion (shared deadline if timeout is set)
//!   │      ├─ Ok           → debug
//!   │      ├─ Err(cause)   → warn, keep waiting on the others
//!   │      └─ deadline hit → warn, collected as stuck
//!   ├─► clear the registry (always)
//!   ├─► AllStoppedWithin │ GraceExceeded{stuck}
//!   └─► close the subscriber listener (queued events are delivered first)
//! ```
//!
//! ## Rules
//! - Names are unique; a duplicate registration is an error, never an overwrite.
//! - Stop failures are logged, not returned; only missed deadlines are.
//! - Events published after the first `shutdown_all` no longer reach subscribers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, ServiceError};
use crate::events::{Event, EventKind};
use crate::registry::shutdown;
use crate::service::{ServiceRef, ServiceState};
use crate::telemetry::Telemetry;

/// Name → service map with coordinated shutdown.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceRef>>,
    telemetry: Telemetry,
    grace: Option<Duration>,
    /// Subscriber listener: close signal and task handle.
    listener: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    ///
    /// `grace` bounds [`shutdown`](Self::shutdown) and
    /// [`run_until_signal`](Self::run_until_signal); `None` waits for every service.
    pub fn new(telemetry: Telemetry, grace: Option<Duration>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            telemetry,
            grace,
            listener: Mutex::new(None),
        }
    }

    /// Hands the subscriber listener to the registry, which closes it on shutdown.
    pub(crate) fn with_listener(self, close: CancellationToken, join: JoinHandle<()>) -> Self {
        *self.listener.lock() = Some((close, join));
        self
    }

    /// Telemetry shared with services built for this registry.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Registers `service` under its name.
    ///
    /// Fails with [`ServiceError::AlreadyAdded`] if the name is taken; the
    /// existing registration is kept.
    pub async fn add_shutdown_hook(&self, service: ServiceRef) -> Result<(), ServiceError> {
        let name = service.name().to_owned();
        match self.services.write().await.entry(name.clone()) {
            Entry::Occupied(_) => {
                warn!(service = %name, "service already registered");
                return Err(ServiceError::AlreadyAdded { name });
            }
            Entry::Vacant(slot) => {
                slot.insert(service);
            }
        }

        info!(service = %name, "service registered");
        self.telemetry
            .publish(Event::new(EventKind::ServiceRegistered).with_service(name));
        Ok(())
    }

    /// Removes the service registered as `name`; logs if there is none.
    pub async fn remove_shutdown_hook(&self, name: &str) -> Option<ServiceRef> {
        let removed = self.services.write().await.remove(name);
        match &removed {
            Some(_) => {
                info!(service = %name, "service deregistered");
                self.telemetry
                    .publish(Event::new(EventKind::ServiceDeregistered).with_service(name));
            }
            None => warn!(service = %name, "remove requested for unknown service"),
        }
        removed
    }

    /// Service registered as `name`.
    pub async fn get(&self, name: &str) -> Option<ServiceRef> {
        self.services.read().await.get(name).cloned()
    }

    /// Returns true if a service is registered as `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.services.read().await.contains_key(name)
    }

    /// Returns sorted list of registered names.
    pub async fn list(&self) -> Vec<String> {
        let services = self.services.read().await;
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered services.
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// Returns true if registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// Stops every registered service and clears the registry.
    ///
    /// With `timeout`, services still stopping at the deadline are reported
    /// in [`RuntimeError::GraceExceeded`]. Stop failures are only logged.
    pub async fn shutdown_all(&self, timeout: Option<Duration>) -> Result<(), RuntimeError> {
        let services: Vec<(String, ServiceRef)> = self
            .services
            .read()
            .await
            .iter()
            .map(|(name, svc)| (name.clone(), svc.clone()))
            .collect();

        info!(services = services.len(), timeout = ?timeout, "shutting down all services");
        self.telemetry.publish(Event::new(EventKind::ShutdownRequested));

        let deadline = timeout.map(|t| Instant::now() + t);
        let waits = services.into_iter().map(|(name, svc)| {
            let done = svc.stop();
            async move {
                let outcome = match deadline {
                    Some(at) => timeout_at(at, done.wait()).await.ok(),
                    None => Some(done.wait().await),
                };
                (name, outcome)
            }
        });
        let outcomes = join_all(waits.collect::<Vec<_>>()).await;

        let mut stuck = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Some(Ok(state)) => debug!(service = %name, %state, "service stopped"),
                Some(Err(e)) => warn!(service = %name, error = %e, "service failed to stop cleanly"),
                None => {
                    warn!(service = %name, "service did not stop in time");
                    stuck.push(name);
                }
            }
        }

        self.services.write().await.clear();

        let res = if stuck.is_empty() {
            info!("all services stopped");
            self.telemetry.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            stuck.sort_unstable();
            self.telemetry
                .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
            Err(RuntimeError::GraceExceeded {
                grace: timeout.unwrap_or_default(),
                stuck,
            })
        };
        self.close_listener().await;
        res
    }

    /// Stops the subscriber listener and waits until subscribers drained their queues.
    async fn close_listener(&self) {
        let Some((close, join)) = self.listener.lock().take() else {
            return;
        };
        close.cancel();
        if let Err(e) = join.await {
            warn!(error = %e, "subscriber listener ended abnormally");
        }
    }

    /// [`shutdown_all`](Self::shutdown_all) bounded by the configured grace.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.shutdown_all(self.grace).await
    }

    /// Waits for a termination signal, then shuts everything down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let signal = shutdown::wait_for_shutdown_signal().await?;
        info!(signal, "termination signal received");
        self.shutdown().await
    }

    /// States of the registered services, sorted by name.
    pub async fn snapshot(&self) -> Vec<(String, ServiceState)> {
        let services = self.services.read().await;
        let mut states: Vec<(String, ServiceState)> = services
            .iter()
            .map(|(name, svc)| (name.clone(), svc.state()))
            .collect();
        states.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::Bus;
    use crate::service::{Immediate, Lifecycle, ServiceCore};

    /// Stop never acknowledged.
    struct Hung;

    impl Lifecycle for Hung {
        fn do_start(&self, core: &ServiceCore) -> anyhow::Result<()> {
            core.started()?;
            Ok(())
        }

        fn do_stop(&self, _core: &ServiceCore) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct BrokenStop;

    impl Lifecycle for BrokenStop {
        fn do_start(&self, core: &ServiceCore) -> anyhow::Result<()> {
            core.started()?;
            Ok(())
        }

        fn do_stop(&self, _core: &ServiceCore) -> anyhow::Result<()> {
            anyhow::bail!("socket already closed")
        }
    }

    async fn running(core: ServiceCore) -> Arc<ServiceCore> {
        core.start().await.unwrap();
        Arc::new(core)
    }

    #[tokio::test]
    async fn test_duplicate_name_keeps_first_registration() {
        let registry = ServiceRegistry::new(Telemetry::default(), None);
        let first = running(ServiceCore::new("db", Immediate)).await;
        let second = Arc::new(ServiceCore::new("db", Immediate));

        registry.add_shutdown_hook(first.clone()).await.unwrap();
        let err = registry.add_shutdown_hook(second).await.unwrap_err();
        assert_eq!(err, ServiceError::AlreadyAdded { name: "db".into() });

        assert_eq!(registry.list().await, vec!["db".to_string()]);
        let kept = registry.get("db").await.unwrap();
        assert_eq!(kept.state(), ServiceState::Running);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_not_an_error() {
        let registry = ServiceRegistry::new(Telemetry::default(), None);
        registry
            .add_shutdown_hook(Arc::new(ServiceCore::new("cache", Immediate)))
            .await
            .unwrap();

        assert!(registry.remove_shutdown_hook("missing").await.is_none());
        assert!(registry.remove_shutdown_hook("cache").await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_all_survives_stop_failure() {
        let registry = ServiceRegistry::new(Telemetry::default(), None);
        let ok = running(ServiceCore::new("api", Immediate)).await;
        let broken = running(ServiceCore::new("ws", BrokenStop)).await;
        registry.add_shutdown_hook(ok.clone()).await.unwrap();
        registry.add_shutdown_hook(broken.clone()).await.unwrap();
        assert_eq!(registry.len().await, 2);

        registry.shutdown_all(Some(Duration::from_secs(1))).await.unwrap();

        assert!(registry.is_empty().await);
        assert_eq!(ok.state(), ServiceState::Terminated);
        assert_eq!(broken.state(), ServiceState::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_all_reports_stuck_services() {
        let bus = Bus::new(32);
        let mut rx = bus.subscribe();
        let telemetry = Telemetry::default().with_bus(bus);
        let registry = ServiceRegistry::new(telemetry.clone(), None);

        let hung = running(ServiceCore::with_telemetry("hung", Hung, telemetry.clone())).await;
        let fine = running(ServiceCore::with_telemetry("fine", Immediate, telemetry)).await;
        registry.add_shutdown_hook(hung.clone()).await.unwrap();
        registry.add_shutdown_hook(fine).await.unwrap();

        let timeout = Duration::from_millis(20);
        match registry.shutdown_all(Some(timeout)).await {
            Err(RuntimeError::GraceExceeded { grace, stuck }) => {
                assert_eq!(grace, timeout);
                assert_eq!(stuck, vec!["hung".to_string()]);
            }
            other => panic!("expected GraceExceeded, got {other:?}"),
        }
        assert!(registry.is_empty().await);
        assert_eq!(hung.state(), ServiceState::Stopping);

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        let requested = kinds.iter().position(|k| *k == EventKind::ShutdownRequested);
        let exceeded = kinds.iter().position(|k| *k == EventKind::GraceExceeded);
        assert!(requested.is_some() && exceeded.is_some());
        assert!(requested < exceeded);
        assert!(!kinds.contains(&EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn test_shutdown_uses_configured_grace() {
        let registry = ServiceRegistry::new(Telemetry::default(), Some(Duration::from_millis(10)));
        let hung = running(ServiceCore::new("hung", Hung)).await;
        registry.add_shutdown_hook(hung).await.unwrap();

        let err = registry.shutdown().await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_grace_exceeded");
    }

    #[tokio::test]
    async fn test_snapshot_lists_states() {
        let registry = ServiceRegistry::new(Telemetry::default(), None);
        registry
            .add_shutdown_hook(running(ServiceCore::new("b", Immediate)).await)
            .await
            .unwrap();
        registry
            .add_shutdown_hook(Arc::new(ServiceCore::new("a", Immediate)))
            .await
            .unwrap();

        assert_eq!(
            registry.snapshot().await,
            vec![
                ("a".to_string(), ServiceState::New),
                ("b".to_string(), ServiceState::Running),
            ]
        );
        assert!(registry.contains("a").await);
    }
}
