//! # Worker abstraction and function-backed worker.
//!
//! A [`Worker`] supplies the hooks a [`SupervisedService`](crate::SupervisedService)
//! runs on its dedicated task: `on_start` before (and after each restart),
//! `step` repeatedly, `on_stop` after a failure and at shutdown.
//!
//! `step` receives a [`CancellationToken`] that is cancelled on stop, restart
//! and interrupt. Blocking steps should select on it and return
//! [`StepError::Canceled`].

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StepError;

/// # Supervised unit of continuous work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use servicevisor::{StepError, Worker};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Worker for Heartbeat {
///     async fn step(&self, ctx: CancellationToken) -> Result<(), StepError> {
///         tokio::select! {
///             _ = ctx.cancelled() => Err(StepError::Canceled),
///             _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => Ok(()),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Prepares resources; runs before the first step and after every restart.
    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Performs one unit of work. May block until `ctx` is cancelled.
    async fn step(&self, ctx: CancellationToken) -> Result<(), StepError>;

    /// Releases resources; runs after a failed step and once at shutdown.
    async fn on_stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Function-backed worker: wraps a closure producing one step future per call.
///
/// `on_start`/`on_stop` are no-ops.
pub struct WorkerFn<F> {
    f: F,
}

impl<F> WorkerFn<F> {
    /// Wraps `f`.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), StepError>>,
    {
        Self { f }
    }
}

impl<F> fmt::Debug for WorkerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkerFn")
    }
}

#[async_trait]
impl<F, Fut> Worker for WorkerFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StepError>> + Send + 'static,
{
    async fn step(&self, ctx: CancellationToken) -> Result<(), StepError> {
        (self.f)(ctx).await
    }
}
