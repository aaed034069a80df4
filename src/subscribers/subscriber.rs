//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for observing service events outside
//! the publishing path.
//!
//! Each subscriber gets:
//! - a dedicated worker task
//! - its own bounded queue (capacity via [`Subscribe::queue_capacity`])
//! - panic isolation (reported as `EventKind::SubscriberPanicked`)
//!
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → SubscriberPanicked
//! ```
//!
//! ## Rules
//! - A slow subscriber only fills its own queue.
//! - Overflow drops the event for that subscriber and publishes `SubscriberOverflow`.
//! - Events are handled sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use servicevisor::{Event, EventKind, Subscribe};
//!
//! struct FailureAlerts;
//!
//! #[async_trait]
//! impl Subscribe for FailureAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::ServiceFailed) {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "alerts" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of service events.
///
/// Implementations should use async I/O and handle their own errors; a slow
/// subscriber delays only its own queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event, called from the subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in overflow/panic events.
    ///
    /// The default is `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
