//! # One-shot completion futures.
//!
//! A [`Completer`] is resolved at most once; the first resolution wins and
//! later attempts are no-ops. Any number of [`Completion`] handles observe the
//! same result. Built on [`tokio::sync::watch`], so resolving never blocks and
//! needs no runtime; waiting does.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::ServiceError;
use crate::service::ServiceState;

/// Result carried by a lifecycle completion.
pub type Outcome = Result<ServiceState, ServiceError>;

/// Write side of a one-shot completion.
pub(crate) struct Completer {
    tx: watch::Sender<Option<Outcome>>,
    service: Arc<str>,
}

impl Completer {
    pub(crate) fn new(service: Arc<str>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, service }
    }

    /// Resolves the completion; returns `false` if it was already resolved.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub(crate) fn handle(&self) -> Completion {
        Completion {
            rx: self.tx.subscribe(),
            service: Arc::clone(&self.service),
        }
    }
}

/// Read side of a one-shot completion; cheap to clone.
///
/// Await it directly or via [`wait`](Self::wait):
/// ```rust,no_run
/// # async fn demo(svc: &servicevisor::ServiceCore) -> Result<(), servicevisor::ServiceError> {
/// let state = svc.start().await?;
/// # let _ = state; Ok(()) }
/// ```
#[derive(Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Outcome>>,
    service: Arc<str>,
}

impl Completion {
    /// Waits until the completion is resolved.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_closed) => None,
        };
        resolved.unwrap_or_else(|| {
            Err(ServiceError::Abandoned {
                service: self.service.to_string(),
            })
        })
    }

    /// Waits at most `timeout`; `None` if still unresolved.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    /// Current result without waiting.
    pub fn peek(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    /// `true` once resolved.
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// `true` if both handles observe the same completion.
    pub fn same_as(&self, other: &Completion) -> bool {
        self.rx.same_channel(&other.rx)
    }
}

impl IntoFuture for Completion {
    type Output = Outcome;
    type IntoFuture = BoxFuture<'static, Outcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("service", &self.service)
            .field("outcome", &*self.rx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completer() -> Completer {
        Completer::new(Arc::from("svc"))
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let c = completer();
        let h = c.handle();
        assert!(!h.is_done());

        assert!(c.complete(Ok(ServiceState::Running)));
        assert!(!c.complete(Ok(ServiceState::Terminated)));
        assert!(!c.complete(Err(ServiceError::failed("svc", "late"))));

        assert_eq!(h.wait().await, Ok(ServiceState::Running));
        assert_eq!(h.peek(), Some(Ok(ServiceState::Running)));
    }

    #[tokio::test]
    async fn test_waiters_wake_on_resolution() {
        let c = completer();
        let h = c.handle();
        let waiter = tokio::spawn(async move { h.await });

        tokio::task::yield_now().await;
        c.complete(Ok(ServiceState::Terminated));
        assert_eq!(waiter.await.unwrap(), Ok(ServiceState::Terminated));
    }

    #[tokio::test]
    async fn test_dropped_completer_reports_abandoned() {
        let c = completer();
        let h = c.handle();
        drop(c);
        assert!(matches!(h.wait().await, Err(ServiceError::Abandoned { .. })));
    }

    #[tokio::test]
    async fn test_wait_timeout_and_identity() {
        let c = completer();
        let a = c.handle();
        let b = c.handle();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&completer().handle()));
        assert_eq!(a.wait_timeout(Duration::from_millis(10)).await, None);
    }
}
