//! Message services: submit-style services built on the lifecycle core.
//!
//! - [`Process`] / [`ProcessFn`] the message handler
//! - [`MessageService`] the submit contract, with [`MessageStats`]
//! - [`SyncMessageService`] processes inline on the caller's task
//! - [`QueuedMessageService`] enqueues and drains on a supervised worker

mod contract;
mod process;
mod queue;
mod queued;
mod sync;

pub use contract::{MessageService, MessageStats};
pub use process::{Process, ProcessFn};
pub use queued::QueuedMessageService;
pub use sync::SyncMessageService;
