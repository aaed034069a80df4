//! # The `Service` contract.
//!
//! A [`Service`] is a named unit with asynchronous start/stop. Every flavour in
//! this crate implements it, which is what lets a
//! [`ServiceRegistry`](crate::ServiceRegistry) shut heterogeneous services down together.

use std::sync::Arc;

use crate::service::{Completion, ServiceCore, ServiceState};

/// Named, asynchronously startable and stoppable unit.
///
/// # Example
/// ```
/// use servicevisor::{Immediate, Service, ServiceCore, ServiceState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let svc = ServiceCore::new("cache", Immediate);
/// assert_eq!(svc.start().await, Ok(ServiceState::Running));
/// assert_eq!(Service::stop(&svc).await, Ok(ServiceState::Terminated));
/// # }
/// ```
pub trait Service: Send + Sync + 'static {
    /// Stable, unique name.
    fn name(&self) -> &str;

    /// Requests start; idempotent, returns the start completion.
    fn start(&self) -> Completion;

    /// Requests stop; idempotent, returns the stop completion.
    fn stop(&self) -> Completion;

    /// Current lifecycle state.
    fn state(&self) -> ServiceState;
}

/// Shared reference to a service (`Arc<dyn Service>`).
pub type ServiceRef = Arc<dyn Service>;

impl Service for ServiceCore {
    fn name(&self) -> &str {
        ServiceCore::name(self)
    }

    fn start(&self) -> Completion {
        ServiceCore::start(self)
    }

    fn stop(&self) -> Completion {
        ServiceCore::stop(self)
    }

    fn state(&self) -> ServiceState {
        ServiceCore::state(self)
    }
}
