//! # Runtime configuration.
//!
//! [`Config`] centralizes the knobs used by supervised workers, message
//! services and the registry. It is consumed by
//! [`ServiceBuilder`](crate::ServiceBuilder) and
//! [`RegistryBuilder`](crate::RegistryBuilder).
//!
//! ## Sentinel values
//! - `queue_capacity = 0` → unbounded queue
//! - `grace = 0s` → `shutdown_all` waits without a bound
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Configuration shared by services built from one [`ServiceBuilder`](crate::ServiceBuilder).
///
/// ## Field semantics
/// - `restart_delay`: fixed pause before a failed worker is re-armed (no growth)
/// - `poll_timeout`: how long one drain step waits on an empty queue
/// - `offer_timeout`: how long one blocking enqueue attempt waits for space
/// - `queue_capacity`: queue bound (`0` = unbounded)
/// - `skip_on_full`: drop instead of block when the queue is full
/// - `propagate_failures`: re-raise processing errors from synchronous submit
/// - `grace`: bound for registry-wide shutdown (`0s` = unbounded)
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct Config {
    /// Delay between a worker failure and its restart.
    ///
    /// Restarts are unbounded; the delay is the same for every attempt.
    pub restart_delay: Duration,

    /// Upper bound on a single queue poll.
    ///
    /// Also bounds how long a stop request can go unobserved by an idle drain loop.
    pub poll_timeout: Duration,

    /// Upper bound on a single enqueue attempt under the blocking policy.
    pub offer_timeout: Duration,

    /// Maximum number of queued messages (`0` = unbounded).
    pub queue_capacity: usize,

    /// Skip policy: a full queue rejects the message immediately.
    pub skip_on_full: bool,

    /// Synchronous submit returns processing errors instead of swallowing them.
    pub propagate_failures: bool,

    /// Maximum time `shutdown_all` waits for every service to stop.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the queue bound as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` queued messages
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        if self.queue_capacity == 0 {
            None
        } else {
            Some(self.queue_capacity)
        }
    }

    /// Returns the shutdown bound as an `Option` (`None` → wait until all stop).
    #[inline]
    pub fn shutdown_grace(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `restart_delay = 1s`
    /// - `poll_timeout = 100ms`, `offer_timeout = 100ms`
    /// - `queue_capacity = 0` (unbounded), blocking policy
    /// - `propagate_failures = false`
    /// - `grace = 60s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(1),
            poll_timeout: Duration::from_millis(100),
            offer_timeout: Duration::from_millis(100),
            queue_capacity: 0,
            skip_on_full: false,
            propagate_failures: false,
            grace: Duration::from_secs(60),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let mut cfg = Config::default();
        assert_eq!(cfg.queue_limit(), None);
        assert_eq!(cfg.shutdown_grace(), Some(Duration::from_secs(60)));

        cfg.queue_capacity = 8;
        cfg.grace = Duration::ZERO;
        cfg.bus_capacity = 0;
        assert_eq!(cfg.queue_limit(), Some(8));
        assert_eq!(cfg.shutdown_grace(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
