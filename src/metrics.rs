//! # Metrics collaborator.
//!
//! Services never own a metrics backend; they register named instruments with
//! a [`MetricsRegistry`] and increment/set them. Two registries ship with the crate:
//!
//! - [`NoopMetrics`] discards everything (the default).
//! - [`LocalMetrics`] in-memory atomics, readable by name (tests, embedders).
//!
//! ## Instruments registered by services
//! ```text
//! <name>.status     gauge    ServiceState::code() after every transition
//! <name>.submitted  counter  submit() calls that reached a running service
//! <name>.skipped    counter  messages dropped, refused or withdrawn
//! <name>.processed  counter  messages the processor accepted
//! <name>.failed     counter  processor errors (and panics, when queued)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Monotonic counter.
pub trait Counter: Send + Sync {
    /// Increments by one.
    fn inc(&self);
}

/// Last-value gauge.
pub trait Gauge: Send + Sync {
    /// Replaces the current value.
    fn set(&self, value: i64);
}

/// Hands out named instruments. Must be usable with no-op implementations.
pub trait MetricsRegistry: Send + Sync {
    /// Returns the counter registered under `name`, creating it if needed.
    fn counter(&self, name: &str) -> Arc<dyn Counter>;

    /// Returns the gauge registered under `name`, creating it if needed.
    fn gauge(&self, name: &str) -> Arc<dyn Gauge>;
}

/// Registry whose instruments discard every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

struct Noop;

impl Counter for Noop {
    fn inc(&self) {}
}

impl Gauge for Noop {
    fn set(&self, _value: i64) {}
}

impl MetricsRegistry for NoopMetrics {
    fn counter(&self, _name: &str) -> Arc<dyn Counter> {
        Arc::new(Noop)
    }

    fn gauge(&self, _name: &str) -> Arc<dyn Gauge> {
        Arc::new(Noop)
    }
}

#[derive(Default)]
struct LocalCounter(AtomicU64);

impl Counter for LocalCounter {
    fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct LocalGauge(AtomicI64);

impl Gauge for LocalGauge {
    fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// In-memory registry; instruments with the same name are shared.
#[derive(Default)]
pub struct LocalMetrics {
    counters: Mutex<HashMap<String, Arc<LocalCounter>>>,
    gauges: Mutex<HashMap<String, Arc<LocalGauge>>>,
}

impl LocalMetrics {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the named counter, `None` if never registered.
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        self.counters
            .lock()
            .get(name)
            .map(|c| c.0.load(Ordering::Relaxed))
    }

    /// Current value of the named gauge, `None` if never registered.
    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        self.gauges
            .lock()
            .get(name)
            .map(|g| g.0.load(Ordering::Relaxed))
    }
}

impl MetricsRegistry for LocalMetrics {
    fn counter(&self, name: &str) -> Arc<dyn Counter> {
        self.counters
            .lock()
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    fn gauge(&self, name: &str) -> Arc<dyn Gauge> {
        self.gauges.lock().entry(name.to_owned()).or_default().clone()
    }
}

impl std::fmt::Debug for LocalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMetrics")
            .field("counters", &self.counters.lock().len())
            .field("gauges", &self.gauges.lock().len())
            .finish()
    }
}

/// Counter that keeps a local tally next to the exported instrument.
pub(crate) struct Tally {
    local: AtomicU64,
    sink: Arc<dyn Counter>,
}

impl Tally {
    pub(crate) fn new(sink: Arc<dyn Counter>) -> Self {
        Self {
            local: AtomicU64::new(0),
            sink,
        }
    }

    pub(crate) fn inc(&self) {
        self.local.fetch_add(1, Ordering::Relaxed);
        self.sink.inc();
    }

    pub(crate) fn get(&self) -> u64 {
        self.local.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_metrics_share_instruments_by_name() {
        let m = LocalMetrics::new();
        m.counter("a.submitted").inc();
        m.counter("a.submitted").inc();
        m.gauge("a.status").set(2);

        assert_eq!(m.counter_value("a.submitted"), Some(2));
        assert_eq!(m.gauge_value("a.status"), Some(2));
        assert_eq!(m.counter_value("missing"), None);
    }

    #[test]
    fn test_tally_forwards_to_sink() {
        let m = LocalMetrics::new();
        let t = Tally::new(m.counter("x"));
        t.inc();
        t.inc();
        assert_eq!(t.get(), 2);
        assert_eq!(m.counter_value("x"), Some(2));
    }

    #[test]
    fn test_noop_accepts_updates() {
        let m = NoopMetrics;
        m.counter("c").inc();
        m.gauge("g").set(-1);
    }
}
