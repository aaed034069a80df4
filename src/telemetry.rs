//! # Telemetry handle shared by services.
//!
//! [`Telemetry`] bundles the two outward-facing collaborators of every service:
//! an optional event [`Bus`] and a [`MetricsRegistry`]. The default has no bus
//! and no-op metrics, which changes nothing about service behavior.

use std::fmt;
use std::sync::Arc;

use crate::events::{Bus, Event};
use crate::metrics::{MetricsRegistry, NoopMetrics};

/// Observability sinks handed to services at construction.
#[derive(Clone)]
pub struct Telemetry {
    bus: Option<Bus>,
    metrics: Arc<dyn MetricsRegistry>,
}

impl Telemetry {
    /// Telemetry with an event bus and the given metrics registry.
    pub fn new(bus: Option<Bus>, metrics: Arc<dyn MetricsRegistry>) -> Self {
        Self { bus, metrics }
    }

    /// Replaces the event bus.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replaces the metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Event bus, if any.
    pub fn bus(&self) -> Option<&Bus> {
        self.bus.as_ref()
    }

    /// Metrics registry.
    pub fn metrics(&self) -> &Arc<dyn MetricsRegistry> {
        &self.metrics
    }

    /// Publishes to the bus when one is attached.
    #[inline]
    pub fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev);
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            bus: None,
            metrics: Arc::new(NoopMetrics),
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}
