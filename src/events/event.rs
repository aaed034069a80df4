//! # Runtime events emitted by services, workers and the registry.
//!
//! [`EventKind`] classifies events into four groups:
//! - **Lifecycle**: state transitions of a [`ServiceCore`](crate::ServiceCore)
//! - **Worker**: step failures and restarts of a supervised worker
//! - **Messages**: skipped submissions and processing errors
//! - **Registry**: registration and coordinated shutdown
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use servicevisor::{Event, EventKind, ServiceState};
//!
//! let ev = Event::new(EventKind::ServiceFailed)
//!     .with_service("ingest")
//!     .with_state(ServiceState::Failed)
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::ServiceFailed);
//! assert_eq!(ev.service.as_deref(), Some("ingest"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::service::ServiceState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle ===
    /// `start()` accepted; `state` = `Starting`.
    ServiceStarting,
    /// `started()` acknowledged; `state` = `Running`.
    ServiceRunning,
    /// `stop()` accepted while running; `state` = `Stopping`.
    ServiceStopping,
    /// `stopped()` acknowledged; `state` = `Terminated`.
    ServiceTerminated,
    /// Service failed; `reason` carries the cause.
    ServiceFailed,

    // === Worker ===
    /// A step returned a transient failure (or panicked).
    ///
    /// Sets `reason` and `delay_ms` (pause before re-arming).
    StepFailed,
    /// Worker re-armed after a failure or a restart request; `reason` = previous cause.
    WorkerRestarting,
    /// `restart()` was called on a running service.
    RestartRequested,
    /// Worker loop hit an unrecoverable error and exited.
    WorkerFatal,

    // === Messages ===
    /// A submitted message was dropped, refused or withdrawn.
    MessageSkipped,
    /// Processing a message failed (swallowed or propagated).
    ProcessFailed,

    // === Registry ===
    /// A service was added to the registry.
    ServiceRegistered,
    /// A service was removed from the registry.
    ServiceDeregistered,
    /// Registry-wide shutdown started.
    ShutdownRequested,
    /// Every service reached a terminal state within the grace period.
    AllStoppedWithin,
    /// Some services did not stop within the grace period.
    GraceExceeded,

    // === Subscribers ===
    /// Subscriber queue was full; the event was dropped for it.
    SubscriberOverflow,
    /// Subscriber panicked while handling an event.
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// Service state after the event, if applicable.
    pub state: Option<ServiceState>,
    /// Human-readable reason (errors, skip reasons).
    pub reason: Option<Arc<str>>,
    /// Delay in milliseconds (restart pause).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            state: None,
            reason: None,
            delay_ms: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a service state.
    #[inline]
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Event for a lifecycle transition into `state`.
    pub fn transition(service: &str, state: ServiceState) -> Option<Self> {
        let kind = match state {
            ServiceState::Starting => EventKind::ServiceStarting,
            ServiceState::Running => EventKind::ServiceRunning,
            ServiceState::Stopping => EventKind::ServiceStopping,
            ServiceState::Terminated => EventKind::ServiceTerminated,
            ServiceState::Failed => EventKind::ServiceFailed,
            ServiceState::New | ServiceState::ShutdownRequested => return None,
        };
        Some(Event::new(kind).with_service(service).with_state(state))
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::ShutdownRequested);
        let b = Event::new(EventKind::ShutdownRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_transition_mapping() {
        let ev = Event::transition("svc", ServiceState::Running).unwrap();
        assert_eq!(ev.kind, EventKind::ServiceRunning);
        assert_eq!(ev.state, Some(ServiceState::Running));
        assert!(Event::transition("svc", ServiceState::New).is_none());
    }
}
