//! # Event subscribers.
//!
//! [`Subscribe`] plugs custom handlers into the event stream of a
//! [`ServiceRegistry`](crate::ServiceRegistry); [`SubscriberSet`] fans events
//! out to them.
//!
//! ```text
//!   ServiceCore / workers / registry ── publish ──► Bus
//!                                                    │
//!                                          registry listener
//!                                                    │
//!                                             SubscriberSet
//!                                         ┌──────────┼──────────┐
//!                                         ▼          ▼          ▼
//!                                     LogWriter    Metrics    Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
