//! Shared pool bookkeeping and diagnostics snapshots.

use std::sync::Arc;
use std::time::Duration;

use crate::conn::PooledRecord;

/// The pool's shared mutable state.
///
/// Every field is read and written only behind the pool's single mutex; the
/// lock is held for bookkeeping, never across I/O.
pub(crate) struct PoolState {
    /// Idle connections, most recently released last.
    ///
    /// Reuse pops from the back so the pool touches as few distinct physical
    /// connections as possible.
    pub(crate) idle: Vec<Arc<PooledRecord>>,

    /// Checked-out connections in checkout order; index 0 is the oldest.
    pub(crate) active: Vec<Arc<PooledRecord>>,

    /// Capacity slots held by in-flight opens.
    ///
    /// Counted against `max_active` so concurrent acquires cannot overshoot
    /// capacity while a connect is in progress outside the lock.
    pub(crate) reserved: usize,

    /// Type code every pooled connection is expected to carry.
    pub(crate) expected_type_code: u64,

    /// Set once the pool is closed; acquires fail fast afterwards.
    pub(crate) closed: bool,

    pub(crate) stats: PoolStats,
}

impl PoolState {
    pub(crate) fn new(expected_type_code: u64) -> Self {
        Self {
            idle: Vec::new(),
            active: Vec::new(),
            reserved: 0,
            expected_type_code,
            closed: false,
            stats: PoolStats::default(),
        }
    }
}

/// Accumulated counters, updated under the pool lock.
#[derive(Debug, Default, Clone)]
pub(crate) struct PoolStats {
    pub(crate) request_count: u64,
    pub(crate) accumulated_request_time: Duration,
    pub(crate) accumulated_checkout_time: Duration,
    pub(crate) claimed_overdue_count: u64,
    pub(crate) accumulated_checkout_time_of_overdue: Duration,
    pub(crate) had_to_wait_count: u64,
    pub(crate) accumulated_wait_time: Duration,
    pub(crate) bad_connection_count: u64,
}

/// Point-in-time occupancy of the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available for reuse.
    pub idle: usize,
    /// Number of connections currently checked out.
    pub active: usize,
    /// Pool capacity.
    pub max: usize,
}

impl PoolStatus {
    /// Fraction of capacity in use, as a percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.active as f64 / self.max as f64) * 100.0
    }

    /// Whether every capacity slot is occupied.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.idle + self.active >= self.max
    }
}

/// Metrics snapshot for observability collaborators.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Successful acquires since the pool was created.
    pub requests: u64,
    /// Mean time an acquire took, including waiting.
    pub average_request_time: Duration,
    /// Mean time connections spent checked out.
    pub average_checkout_time: Duration,
    /// Mean time spent waiting by acquires that had to wait.
    pub average_wait_time: Duration,
    /// Acquires that had to wait for a connection.
    pub had_to_wait_count: u64,
    /// Overdue active connections forcibly reclaimed.
    pub claimed_overdue_count: u64,
    /// Accumulated bad-connection detections.
    pub bad_connections: u64,
}

impl PoolMetrics {
    pub(crate) fn from_stats(stats: &PoolStats) -> Self {
        let per_request = |total: Duration, count: u64| {
            if count == 0 {
                Duration::ZERO
            } else {
                total / count as u32
            }
        };
        Self {
            requests: stats.request_count,
            average_request_time: per_request(stats.accumulated_request_time, stats.request_count),
            average_checkout_time: per_request(
                stats.accumulated_checkout_time,
                stats.request_count,
            ),
            average_wait_time: per_request(stats.accumulated_wait_time, stats.had_to_wait_count),
            had_to_wait_count: stats.had_to_wait_count,
            claimed_overdue_count: stats.claimed_overdue_count,
            bad_connections: stats.bad_connection_count,
        }
    }
}

impl std::fmt::Display for PoolMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "requests={} avg_request_time={:?} avg_checkout_time={:?} avg_wait_time={:?} \
             had_to_wait={} claimed_overdue={} bad_connections={}",
            self.requests,
            self.average_request_time,
            self.average_checkout_time,
            self.average_wait_time,
            self.had_to_wait_count,
            self.claimed_overdue_count,
            self.bad_connections,
        )
    }
}
