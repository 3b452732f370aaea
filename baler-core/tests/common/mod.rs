//! Shared fixtures for the integration tests

// Each test binary uses a different slice of these helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use baler_core::batch::Batch;
use baler_core::connection::{ClusterConnection, SubmitOutcome};
use baler_core::operation::OperationId;
use baler_core::report::BatchReport;
use tokio::sync::mpsc;

/// Scripted stand-in for the remote store.
///
/// Pops one outcome per submission from the script, answering success
/// once the script runs dry. Records which operations it accepted and
/// tracks its own concurrent-submission high-water mark.
pub struct MockCluster {
    script: Mutex<VecDeque<SubmitOutcome>>,
    seen_ops: Mutex<Vec<OperationId>>,
    batch_shapes: Mutex<Vec<(usize, usize)>>,
    submissions: AtomicUsize,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    available: AtomicBool,
    latency: Duration,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<SubmitOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen_ops: Mutex::new(Vec::new()),
            batch_shapes: Mutex::new(Vec::new()),
            submissions: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            latency: Duration::ZERO,
        }
    }

    /// Hold each submission open for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Flip what the liveness probe reports.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Total submission attempts, including retried ones.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Highest number of submissions ever open at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Ids of every operation in successfully accepted batches, in
    /// submission order.
    pub fn seen_operations(&self) -> Vec<OperationId> {
        self.seen_ops.lock().unwrap().clone()
    }

    /// (operation count, byte size) of every submission attempt.
    pub fn batch_shapes(&self) -> Vec<(usize, usize)> {
        self.batch_shapes.lock().unwrap().clone()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterConnection for MockCluster {
    async fn submit(&self, batch: &Batch) -> SubmitOutcome {
        let open = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(open, Ordering::SeqCst);
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.batch_shapes
            .lock()
            .unwrap()
            .push((batch.len(), batch.bytes()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitOutcome::Success);
        if outcome == SubmitOutcome::Success {
            self.seen_ops
                .lock()
                .unwrap()
                .extend(batch.operation_ids());
        }

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Poll until `predicate` holds or `limit` elapses; returns whether
/// the predicate ever held.
pub async fn wait_for<F>(mut predicate: F, limit: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}

/// Receive exactly `count` reports, panicking when they do not all
/// arrive within `limit`.
pub async fn collect_reports(
    reports: &mut mpsc::UnboundedReceiver<BatchReport>,
    count: usize,
    limit: Duration,
) -> Vec<BatchReport> {
    let deadline = std::time::Instant::now() + limit;
    let mut collected = Vec::with_capacity(count);
    while collected.len() < count {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        match tokio::time::timeout(remaining, reports.recv()).await {
            Ok(Some(report)) => collected.push(report),
            Ok(None) => panic!(
                "report channel closed after {} of {} reports",
                collected.len(),
                count
            ),
            Err(_) => panic!(
                "timed out waiting for report {} of {}",
                collected.len() + 1,
                count
            ),
        }
    }
    collected
}
