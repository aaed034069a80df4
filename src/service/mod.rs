//! Service lifecycle: states, completions, the state machine and the contract.
//!
//! - [`ServiceState`] ordered lifecycle enum
//! - [`Completion`] one-shot, first-writer-wins result handle
//! - [`ServiceCore`] + [`Lifecycle`] the state machine and its hooks
//! - [`Service`] the contract shared by every service flavour

mod completion;
mod contract;
mod core;
mod state;

pub use self::core::{Immediate, Lifecycle, ServiceCore};
pub use completion::{Completion, Outcome};
pub use contract::{Service, ServiceRef};
pub use state::ServiceState;
