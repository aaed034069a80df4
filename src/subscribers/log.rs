//! # LogWriter: events rendered through `tracing`.
//!
//! Failures go out at `warn`/`error`, lifecycle and worker chatter at `info`/`debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  servicevisor::subscribers::log: [running] service=ingest
//! WARN  servicevisor::subscribers::log: [step-failed] service=ingest delay_ms=1000 reason=connection refused
//! DEBUG servicevisor::subscribers::log: [restarting] service=ingest reason=step failed: connection refused
//! INFO  servicevisor::subscribers::log: [shutdown-requested]
//! INFO  servicevisor::subscribers::log: [all-stopped-within-grace]
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber logging every event.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ServiceStarting => debug!("[starting] service={service}"),
            EventKind::ServiceRunning => info!("[running] service={service}"),
            EventKind::ServiceStopping => debug!("[stopping] service={service}"),
            EventKind::ServiceTerminated => info!("[terminated] service={service}"),
            EventKind::ServiceFailed => error!("[failed] service={service} reason={reason}"),
            EventKind::StepFailed => warn!(
                "[step-failed] service={service} delay_ms={:?} reason={reason}",
                e.delay_ms
            ),
            EventKind::WorkerRestarting => {
                debug!("[restarting] service={service} reason={reason}")
            }
            EventKind::RestartRequested => info!("[restart-requested] service={service}"),
            EventKind::WorkerFatal => error!("[fatal] service={service} reason={reason}"),
            EventKind::MessageSkipped => debug!("[skipped] service={service} reason={reason}"),
            EventKind::ProcessFailed => {
                warn!("[process-failed] service={service} reason={reason}")
            }
            EventKind::ServiceRegistered => info!("[registered] service={service}"),
            EventKind::ServiceDeregistered => info!("[deregistered] service={service}"),
            EventKind::ShutdownRequested => info!("[shutdown-requested]"),
            EventKind::AllStoppedWithin => info!("[all-stopped-within-grace]"),
            EventKind::GraceExceeded => warn!("[grace-exceeded] stuck={reason}"),
            EventKind::SubscriberOverflow => {
                warn!("[subscriber-overflow] subscriber={service} reason={reason}")
            }
            EventKind::SubscriberPanicked => {
                error!("[subscriber-panicked] subscriber={service} info={reason}")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
