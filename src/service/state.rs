//! # Service lifecycle states.
//!
//! ```text
//! New ─► Starting ─► Running ─► ShutdownRequested ─► Stopping ─► Terminated
//!   └──────────────────────── any ───────────────────────────► Failed
//! ```
//!
//! The ordering is meaningful: guards compare states ("not yet running",
//! "stopping or later"). `Failed` is absorbing and sorts last.

use std::fmt;

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceState {
    /// Created, never started.
    New,
    /// `start()` accepted, initialization in progress.
    Starting,
    /// Initialization acknowledged via `started()`.
    Running,
    /// Reserved between running and stopping; reported as stopping.
    ShutdownRequested,
    /// `stop()` accepted, teardown in progress.
    Stopping,
    /// Teardown acknowledged via `stopped()`.
    Terminated,
    /// A hook failed; absorbing.
    Failed,
}

impl ServiceState {
    /// Numeric code exported through the status gauge and the atomic snapshot.
    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            ServiceState::New => 0,
            ServiceState::Starting => 1,
            ServiceState::Running => 2,
            ServiceState::ShutdownRequested => 3,
            ServiceState::Stopping => 4,
            ServiceState::Terminated => 5,
            ServiceState::Failed => 6,
        }
    }

    /// Inverse of [`code`](Self::code); unknown codes map to `Failed`.
    #[inline]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => ServiceState::New,
            1 => ServiceState::Starting,
            2 => ServiceState::Running,
            3 => ServiceState::ShutdownRequested,
            4 => ServiceState::Stopping,
            5 => ServiceState::Terminated,
            _ => ServiceState::Failed,
        }
    }

    /// `Terminated` or `Failed`.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Terminated | ServiceState::Failed)
    }

    /// `ShutdownRequested` or `Stopping`.
    #[inline]
    pub const fn is_stopping(self) -> bool {
        matches!(self, ServiceState::ShutdownRequested | ServiceState::Stopping)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ServiceState::New => "new",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::ShutdownRequested => "shutdown_requested",
            ServiceState::Stopping => "stopping",
            ServiceState::Terminated => "terminated",
            ServiceState::Failed => "failed",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_lifecycle() {
        assert!(ServiceState::New < ServiceState::Starting);
        assert!(ServiceState::Starting < ServiceState::Running);
        assert!(ServiceState::Running < ServiceState::ShutdownRequested);
        assert!(ServiceState::ShutdownRequested < ServiceState::Stopping);
        assert!(ServiceState::Stopping < ServiceState::Terminated);
        assert!(ServiceState::Terminated < ServiceState::Failed);
    }

    #[test]
    fn test_code_roundtrip() {
        for code in 0..=6 {
            assert_eq!(ServiceState::from_code(code).code(), code);
        }
        assert_eq!(ServiceState::from_code(200), ServiceState::Failed);
    }
}
