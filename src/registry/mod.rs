//! Registry: services registered by name and shut down together.
//!
//! - [`ServiceRegistry`] the name → service map with coordinated shutdown
//! - [`RegistryBuilder`] wires the registry to an event bus and subscribers
//! - [`wait_for_shutdown_signal`] OS termination signals

mod builder;
#[allow(clippy::module_inception)]
mod registry;
mod shutdown;

pub use builder::RegistryBuilder;
pub use registry::ServiceRegistry;
pub use shutdown::wait_for_shutdown_signal;
