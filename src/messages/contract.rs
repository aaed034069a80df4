//! # The `MessageService` contract and its counters.

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::metrics::{MetricsRegistry, Tally};
use crate::service::Service;

/// Service accepting messages while running.
///
/// `submit` returning `Ok(false)` is a normal rejection (not running, queue
/// full, withdrawn during shutdown), never an error.
#[async_trait]
pub trait MessageService<M: Send + 'static>: Service {
    /// Offers one message; `Ok(true)` when accepted.
    async fn submit(&self, msg: M) -> Result<bool, ServiceError>;

    /// Snapshot of the submission counters.
    fn stats(&self) -> MessageStats;
}

/// Point-in-time view of a message service's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageStats {
    /// Submissions made while the service was running.
    pub submitted: u64,
    /// Messages refused, dropped on a full queue, or withdrawn after a stop.
    pub skipped: u64,
    /// Messages processed successfully.
    pub processed: u64,
    /// Messages whose processing returned an error or panicked.
    pub failed: u64,
}

/// Counters exported as `<name>.submitted`, `<name>.skipped`, `<name>.processed`, `<name>.failed`.
pub(crate) struct Counters {
    pub(crate) submitted: Tally,
    pub(crate) skipped: Tally,
    pub(crate) processed: Tally,
    pub(crate) failed: Tally,
}

impl Counters {
    pub(crate) fn new(service: &str, metrics: &dyn MetricsRegistry) -> Self {
        let tally = |suffix: &str| Tally::new(metrics.counter(&format!("{service}.{suffix}")));
        Self {
            submitted: tally("submitted"),
            skipped: tally("skipped"),
            processed: tally("processed"),
            failed: tally("failed"),
        }
    }

    pub(crate) fn snapshot(&self) -> MessageStats {
        MessageStats {
            submitted: self.submitted.get(),
            skipped: self.skipped.get(),
            processed: self.processed.get(),
            failed: self.failed.get(),
        }
    }
}
