//! Counters describing client activity
//!
//! Plain atomics shared between the facade and the dispatcher tasks.
//! Callers read them through `BulkClient::stats`; there is no exporter
//! wired in here.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated lock-free from every task
#[derive(Debug, Default)]
pub struct BulkMetrics {
    ops_accepted: AtomicU64,
    ops_dispatched: AtomicU64,
    bytes_dispatched: AtomicU64,
    batches_submitted: AtomicU64,
    batches_succeeded: AtomicU64,
    batches_failed: AtomicU64,
    retry_attempts: AtomicU64,
    in_flight: AtomicU64,
}

impl BulkMetrics {
    pub(crate) fn record_accepted(&self, count: u64) {
        self.ops_accepted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, ops: u64, bytes: u64) {
        self.ops_dispatched.fetch_add(ops, Ordering::Relaxed);
        self.bytes_dispatched.fetch_add(bytes, Ordering::Relaxed);
        self.batches_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.batches_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn flight_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn flight_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ops_accepted: self.ops_accepted.load(Ordering::Relaxed),
            ops_dispatched: self.ops_dispatched.load(Ordering::Relaxed),
            bytes_dispatched: self.bytes_dispatched.load(Ordering::Relaxed),
            batches_submitted: self.batches_submitted.load(Ordering::Relaxed),
            batches_succeeded: self.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Operations accepted by `add`
    pub ops_accepted: u64,
    /// Operations handed to the dispatcher inside sealed batches
    pub ops_dispatched: u64,
    /// Estimated bytes handed to the dispatcher
    pub bytes_dispatched: u64,
    /// Batches launched
    pub batches_submitted: u64,
    /// Batches that reached the store
    pub batches_succeeded: u64,
    /// Batches that failed terminally, including abandoned ones
    pub batches_failed: u64,
    /// Individual retry sleeps performed
    pub retry_attempts: u64,
    /// Batches currently between launch and terminal state
    pub in_flight: u64,
}
