//! # servicevisor
//!
//! **Servicevisor** is a service lifecycle library for Rust on tokio.
//!
//! It provides a start/stop state machine with one-shot completions,
//! supervised workers that restart themselves after failures, message
//! services with backpressure, per-request units of work with timeouts, and
//! a registry that shuts many services down together.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────────┐  ┌──────────────────┐  ┌───────────────────────┐
//!   │ ServiceCore      │  │ SupervisedService│  │ QueuedMessageService  │
//!   │ (Lifecycle hooks)│  │ (Worker loop)    │  │ (queue + Drain worker)│
//!   └────────┬─────────┘  └────────┬─────────┘  └───────────┬───────────┘
//!            │  all implement Service (name/start/stop/state)│
//!            ▼                     ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ServiceRegistry (explicit value, owned by main)                  │
//! │  - name → Arc<dyn Service>, unique names                          │
//! │  - shutdown_all(timeout): stop all, wait all, clear               │
//! │  - run_until_signal(): SIGINT/SIGTERM/SIGQUIT → shutdown          │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                │ Telemetry (shared)
//!        transitions, restarts,  ▼  skips, shutdown progress
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! │                (capacity: Config::bus_capacity)                   │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                     registry listener ──► SubscriberSet
//!                                       ┌─────────┼─────────┐
//!                                       ▼         ▼         ▼
//!                                   sub1.on   sub2.on   subN.on
//!                                    _event()  _event()  _event()
//! ```
//!
//! ### Lifecycle
//! ```text
//! New ──start()──► Starting ──started()──► Running ──stop()──► Stopping ──stopped()──► Terminated
//!  │                  │ stop(): deferred         │                  │
//!  └──stop()──► Terminated                       └──── failed(cause) ┴──► Failed (absorbing)
//! ```
//!
//! ### Supervised worker
//! ```text
//! on_start() ─► started()
//! loop while operating {
//!   ├─► (after a failure or restart) on_start()
//!   ├─► step(token)
//!   │     ├─ Ok         ─► again
//!   │     ├─ Fail/panic ─► on_stop(), sleep(restart_delay), re-arm
//!   │     ├─ Canceled   ─► restart? re-arm : stopping? exit : again
//!   │     └─ Fatal      ─► failed(cause), exit
//! }
//! on_stop() ─► stopped()
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                              |
//! |-------------------|----------------------------------------------------------------|-------------------------------------------------|
//! | **Lifecycle**     | Start/stop state machine with shared one-shot completions.     | [`ServiceCore`], [`Lifecycle`], [`Completion`]  |
//! | **Supervision**   | One worker per service, unbounded restarts with fixed delay.   | [`SupervisedService`], [`Worker`], [`WorkerFn`] |
//! | **Messages**      | Inline or queued processing, blocking or skip backpressure.    | [`SyncMessageService`], [`QueuedMessageService`]|
//! | **Units of work** | Exactly-once completion callback racing a timeout.             | [`UnitOfWork`], [`TimeoutScheduler`]            |
//! | **Registry**      | Unique names, coordinated shutdown, OS signals.                | [`ServiceRegistry`], [`RegistryBuilder`]        |
//! | **Observability** | Events, subscribers and a metrics collaborator.                | [`Event`], [`Subscribe`], [`MetricsRegistry`]   |
//! | **Configuration** | Centralized timing and queue settings.                         | [`Config`], [`ServiceBuilder`]                  |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use servicevisor::{Config, RegistryBuilder, Service, ServiceBuilder, StepError, WorkerFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { grace: Duration::from_secs(5), ..Config::default() };
//!     let registry = RegistryBuilder::new(cfg.clone()).build();
//!
//!     let ticker = Arc::new(ServiceBuilder::new("ticker")
//!         .config(cfg)
//!         .telemetry(registry.telemetry().clone())
//!         .supervised(WorkerFn::new(|ctx: CancellationToken| async move {
//!             tokio::select! {
//!                 _ = ctx.cancelled() => Err(StepError::Canceled),
//!                 _ = tokio::time::sleep(Duration::from_millis(50)) => Ok(()),
//!             }
//!         })));
//!
//!     ticker.start().await?;
//!     registry.add_shutdown_hook(ticker.clone()).await?;
//!
//!     // In a real process: registry.run_until_signal().await?
//!     registry.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod error;
mod events;
mod messages;
mod metrics;
mod registry;
mod service;
mod subscribers;
mod supervised;
mod telemetry;
mod work;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use builder::ServiceBuilder;
pub use config::Config;
pub use error::{RuntimeError, ServiceError, StepError, WorkError};
pub use events::{Bus, Event, EventKind};
pub use messages::{
    MessageService, MessageStats, Process, ProcessFn, QueuedMessageService, SyncMessageService,
};
pub use metrics::{Counter, Gauge, LocalMetrics, MetricsRegistry, NoopMetrics};
pub use registry::{RegistryBuilder, ServiceRegistry, wait_for_shutdown_signal};
pub use service::{
    Completion, Immediate, Lifecycle, Outcome, Service, ServiceCore, ServiceRef, ServiceState,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use supervised::{SupervisedService, Worker, WorkerFn};
pub use telemetry::Telemetry;
pub use work::{Cancel, TimeoutHandle, TimeoutScheduler, TokioScheduler, UnitOfWork, WorkState};

// Optional: a built-in subscriber logging every event through `tracing`.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
