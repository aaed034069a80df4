//! # SyncMessageService: process on the submitting task.
//!
//! No queue and no worker. `submit` runs the processor inline, so the caller
//! absorbs its latency. Processing errors are swallowed (logged, `Ok(false)`)
//! or returned as [`ServiceError::Process`], depending on `propagate_failures`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::events::{Event, EventKind};
use crate::messages::contract::Counters;
use crate::messages::{MessageService, MessageStats, Process};
use crate::service::{Completion, Immediate, Service, ServiceCore, ServiceState};
use crate::telemetry::Telemetry;

/// Message service that processes each message inline.
pub struct SyncMessageService<M, P> {
    core: ServiceCore,
    processor: P,
    propagate_failures: bool,
    counters: Counters,
    _msg: PhantomData<fn(M)>,
}

impl<M, P> SyncMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    /// Creates a service with default (silent) telemetry.
    pub fn new(name: impl Into<Arc<str>>, processor: P, propagate_failures: bool) -> Self {
        Self::with_telemetry(name, processor, propagate_failures, Telemetry::default())
    }

    /// Creates a service publishing to `telemetry`.
    pub fn with_telemetry(
        name: impl Into<Arc<str>>,
        processor: P,
        propagate_failures: bool,
        telemetry: Telemetry,
    ) -> Self {
        let name: Arc<str> = name.into();
        let counters = Counters::new(&name, telemetry.metrics().as_ref());
        Self {
            core: ServiceCore::with_telemetry(name, Immediate, telemetry),
            processor,
            propagate_failures,
            counters,
            _msg: PhantomData,
        }
    }

    /// Underlying state machine.
    pub fn core(&self) -> &ServiceCore {
        &self.core
    }

    /// `true` while `Running`.
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Processes `msg` inline if the service is running.
    pub async fn submit(&self, msg: M) -> Result<bool, ServiceError> {
        if !self.core.is_running() {
            debug!(service = %self.core.name(), state = %self.core.state(), "submit rejected");
            return Ok(false);
        }
        self.counters.submitted.inc();

        match self.processor.process(msg).await {
            Ok(()) => {
                self.counters.processed.inc();
                Ok(true)
            }
            Err(e) => {
                self.counters.failed.inc();
                let error = format!("{e:#}");
                self.core.telemetry().publish(
                    Event::new(EventKind::ProcessFailed)
                        .with_service(self.core.name())
                        .with_reason(error.as_str()),
                );
                if self.propagate_failures {
                    return Err(ServiceError::Process {
                        service: self.core.name().to_owned(),
                        error,
                    });
                }
                warn!(service = %self.core.name(), %error, "message processing failed");
                Ok(false)
            }
        }
    }

    /// Snapshot of the submission counters.
    pub fn stats(&self) -> MessageStats {
        self.counters.snapshot()
    }
}

impl<M, P> Service for SyncMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
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

#[async_trait]
impl<M, P> MessageService<M> for SyncMessageService<M, P>
where
    M: Send + 'static,
    P: Process<M>,
{
    async fn submit(&self, msg: M) -> Result<bool, ServiceError> {
        SyncMessageService::submit(self, msg).await
    }

    fn stats(&self) -> MessageStats {
        SyncMessageService::stats(self)
    }
}

impl<M, P> fmt::Debug for SyncMessageService<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncMessageService")
            .field("name", &self.core.name())
            .field("state", &self.core.state())
            .field("propagate_failures", &self.propagate_failures)
            .finish()
    }
}
