//! Units of work: per-request state machines with exactly-once completion.
//!
//! - [`UnitOfWork`] / [`WorkState`] the exchange and its states
//! - [`TimeoutScheduler`] / [`TimeoutHandle`] / [`Cancel`] the timeout contract
//! - [`TokioScheduler`] timeouts as abortable tokio tasks

mod scheduler;
mod unit;

pub use scheduler::{Cancel, TimeoutHandle, TimeoutScheduler, TokioScheduler};
pub use unit::{UnitOfWork, WorkState};
