//! # Message processor abstraction.
//!
//! A [`Process`] handles one message at a time. Both message services call it:
//! [`SyncMessageService`](crate::SyncMessageService) inline on the submitting
//! task, [`QueuedMessageService`](crate::QueuedMessageService) on its drain worker.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

/// Handles submitted messages.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use servicevisor::Process;
///
/// struct Printer;
///
/// #[async_trait]
/// impl Process<String> for Printer {
///     async fn process(&self, msg: String) -> anyhow::Result<()> {
///         println!("{msg}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Process<M: Send + 'static>: Send + Sync + 'static {
    /// Processes one message. Errors are logged (or propagated, for
    /// synchronous services configured to do so).
    async fn process(&self, msg: M) -> anyhow::Result<()>;
}

/// Function-backed processor.
pub struct ProcessFn<M, F> {
    f: F,
    _msg: PhantomData<fn(M)>,
}

impl<M, F> ProcessFn<M, F> {
    /// Wraps `f`.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(M) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        Self {
            f,
            _msg: PhantomData,
        }
    }
}

impl<M, F> fmt::Debug for ProcessFn<M, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProcessFn")
    }
}

#[async_trait]
impl<M, F, Fut> Process<M> for ProcessFn<M, F>
where
    M: Send + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn process(&self, msg: M) -> anyhow::Result<()> {
        (self.f)(msg).await
    }
}
