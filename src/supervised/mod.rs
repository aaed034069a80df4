//! Supervised services: one long-running worker restarted after failures.
//!
//! - [`Worker`] hooks run on the worker task (`on_start`, `step`, `on_stop`)
//! - [`WorkerFn`] closure-backed worker
//! - [`SupervisedService`] the service driving the worker loop

mod service;
mod worker;

pub use service::SupervisedService;
pub use worker::{Worker, WorkerFn};
