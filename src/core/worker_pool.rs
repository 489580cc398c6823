//! Dispatch worker pool.
//!
//! A fixed number of dedicated OS threads, each with its own single-threaded
//! tokio runtime, pull due entries from the work queue and run the
//! throttle-and-deliver protocol on them one at a time. A worker never
//! spawns per-message sub-tasks; store, counter, and sink calls block that
//! worker until they return.
//!
//! # Example
//!
//! ```rust,ignore
//! use throttled_dispatch::config::WorkerPoolConfig;
//! use throttled_dispatch::core::DispatchPool;
//!
//! let pool = DispatchPool::new(
//!     WorkerPoolConfig::new().with_worker_count(5),
//!     dispatcher,
//!     queue.clone(),
//! )?;
//! // ...
//! pool.shutdown();
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::DispatchOutcome;

/// Errors that can occur when using a `DispatchPool`.
#[derive(Debug)]
pub enum PoolError {
    /// Configuration validation failed.
    InvalidConfig(String),

    /// The pool has been shut down.
    PoolShutdown,

    /// Internal error (thread spawn failure, runtime construction, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Entries currently being processed.
    pub active: u64,

    /// Entries taken from the queue since start.
    pub taken: u64,

    /// Protocol runs that ended in `Sent`.
    pub sent: u64,

    /// Protocol runs that ended in `Rescheduled`.
    pub rescheduled: u64,

    /// Protocol runs that ended in `Failed`.
    pub failed: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active: AtomicU64,
    pub taken: AtomicU64,
    pub sent: AtomicU64,
    pub rescheduled: AtomicU64,
    pub failed: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active: self.active.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            rescheduled: self.rescheduled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Count the start of a protocol run.
    pub fn on_taken(&self) {
        self.taken.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Count the end of a protocol run.
    pub fn on_finished(&self, outcome: &DispatchOutcome) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        let counter = match outcome {
            DispatchOutcome::Sent { .. } => &self.sent,
            DispatchOutcome::Rescheduled { .. } => &self.rescheduled,
            DispatchOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub use native::DispatchPool;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RescheduleReason;

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::PoolShutdown;
        assert_eq!(format!("{}", err), "pool has been shut down");

        let err = PoolError::InvalidConfig("worker_count must be greater than 0".into());
        assert_eq!(
            format!("{}", err),
            "invalid configuration: worker_count must be greater than 0"
        );
    }

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();
        assert_eq!(stats.worker_count, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.sent, 0);
    }

    #[test]
    fn test_pool_counters_track_outcomes() {
        let counters = PoolCounters::default();
        counters.on_taken();
        counters.on_taken();
        counters.on_taken();
        counters.on_finished(&DispatchOutcome::Sent { sent_at: 1 });
        counters.on_finished(&DispatchOutcome::Rescheduled {
            due_ms: 2,
            reason: RescheduleReason::Spacing,
        });

        let stats = counters.snapshot(4);
        assert_eq!(stats.worker_count, 4);
        assert_eq!(stats.taken, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.rescheduled, 1);
        assert_eq!(stats.failed, 0);
    }
}
