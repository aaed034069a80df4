//! Error types used by services, workers and units of work.
//!
//! - [`ServiceError`] lifecycle failures surfaced through completion futures,
//!   illegal transitions, registry conflicts and propagated processing errors.
//! - [`StepError`] outcome of a single supervised worker step.
//! - [`WorkError`] failure cause captured by a [`UnitOfWork`](crate::UnitOfWork).
//! - [`RuntimeError`] registry-wide shutdown errors.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::any::Any;
use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceState;

/// # Errors produced by the service lifecycle.
///
/// `Clone` because a single completion result is observed by every waiter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Startup or shutdown hook failed; carries the original cause.
    #[error("service {service} failed: {error}")]
    Failed {
        /// Name of the failed service.
        service: String,
        /// Rendered cause.
        error: String,
    },

    /// Seen by stop waiters when the service never reached `Running`.
    #[error("service failed to start ({service}): {error}")]
    FailedToStart {
        /// Name of the failed service.
        service: String,
        /// Rendered cause of the start failure.
        error: String,
    },

    /// A transition was requested from a state that does not allow it.
    #[error("illegal transition for {service}: expected {expected:?}, found {actual:?}")]
    IllegalState {
        /// Name of the service.
        service: String,
        /// State the transition requires.
        expected: ServiceState,
        /// State the service was actually in.
        actual: ServiceState,
    },

    /// A service with the same name is already registered.
    #[error("service {name} already added")]
    AlreadyAdded {
        /// Conflicting service name.
        name: String,
    },

    /// Processing a submitted message failed and failures are propagated.
    #[error("service {service} failed to process message: {error}")]
    Process {
        /// Name of the message service.
        service: String,
        /// Rendered processing error.
        error: String,
    },

    /// The service was dropped before the completion was resolved.
    #[error("service {service} dropped before completing")]
    Abandoned {
        /// Name of the service.
        service: String,
    },
}

impl ServiceError {
    /// Builds a [`ServiceError::Failed`] from any displayable cause.
    pub fn failed(service: impl Into<String>, cause: impl Display) -> Self {
        ServiceError::Failed {
            service: service.into(),
            error: cause.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servicevisor::ServiceError;
    ///
    /// let err = ServiceError::AlreadyAdded { name: "db".into() };
    /// assert_eq!(err.as_label(), "service_already_added");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Failed { .. } => "service_failed",
            ServiceError::FailedToStart { .. } => "service_failed_to_start",
            ServiceError::IllegalState { .. } => "service_illegal_state",
            ServiceError::AlreadyAdded { .. } => "service_already_added",
            ServiceError::Process { .. } => "service_process_failed",
            ServiceError::Abandoned { .. } => "service_abandoned",
        }
    }

    /// Returns the rendered cause carried by failure variants, if any.
    pub fn cause(&self) -> Option<&str> {
        match self {
            ServiceError::Failed { error, .. }
            | ServiceError::FailedToStart { error, .. }
            | ServiceError::Process { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// # Outcome of one supervised worker step.
///
/// `Fail` is transient and recovered by the restart loop, `Fatal` terminates
/// the service, `Canceled` means the step observed its cancellation token.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// Step failed but the worker should be re-armed and retried.
    #[error("step failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; the worker loop exits and the service fails.
    #[error("fatal error (no restart): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Step was cancelled (stop, restart or interrupt).
    #[error("step cancelled")]
    Canceled,
}

impl StepError {
    /// Transient failure from any displayable cause.
    pub fn fail(cause: impl Display) -> Self {
        StepError::Fail {
            error: cause.to_string(),
        }
    }

    /// Fatal failure from any displayable cause.
    pub fn fatal(cause: impl Display) -> Self {
        StepError::Fatal {
            error: cause.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StepError::Fail { .. } => "step_failed",
            StepError::Fatal { .. } => "step_fatal",
            StepError::Canceled => "step_canceled",
        }
    }

    /// Indicates whether the restart loop recovers from this error.
    ///
    /// # Example
    /// ```
    /// use servicevisor::StepError;
    ///
    /// assert!(StepError::fail("flaky").is_retryable());
    /// assert!(!StepError::fatal("corrupt").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Fail { .. })
    }
}

impl From<anyhow::Error> for StepError {
    fn from(e: anyhow::Error) -> Self {
        StepError::Fail {
            error: format!("{e:#}"),
        }
    }
}

/// # Failure cause captured by a unit of work.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkError {
    /// No response arrived before the attached timeout fired.
    #[error("timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The exchange failed.
    #[error("failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The exchange was abandoned by its owner.
    #[error("cancelled")]
    Canceled,
}

impl WorkError {
    /// Failure from any displayable cause.
    pub fn failed(cause: impl Display) -> Self {
        WorkError::Failed {
            error: cause.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkError::Timeout { .. } => "work_timeout",
            WorkError::Failed { .. } => "work_failed",
            WorkError::Canceled => "work_canceled",
        }
    }
}

/// # Errors produced by the registry when coordinating shutdown.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Some services did not reach a terminal state within the grace period.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of services that did not stop in time.
        stuck: Vec<String>,
    },

    /// Signal handlers could not be installed.
    #[error("failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_to_start_mentions_phrase_and_cause() {
        let err = ServiceError::FailedToStart {
            service: "db".into(),
            error: "boom".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("service failed to start"));
        assert!(msg.contains("boom"));
        assert_eq!(err.cause(), Some("boom"));
    }

    #[test]
    fn test_step_error_from_anyhow_is_transient() {
        let err: StepError = anyhow::anyhow!("connection reset").into();
        assert!(err.is_retryable());
        assert_eq!(err.as_label(), "step_failed");
    }
}
