//! Drives sealed batches to the cluster
//!
//! Each launched batch runs as its own task: submit, classify the
//! outcome, back off and retry transient failures, then release the
//! flight slot and emit a report. The permit is acquired before the
//! batch is sealed and held across retries, so retried batches are
//! never starved by newly sealed ones.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::batch::{Batch, FlushTrigger};
use crate::buffer::BufferLimits;
use crate::config::RetryPolicy;
use crate::connection::{ClusterConnection, SubmitOutcome};
use crate::error::{BalerError, BalerResult};
use crate::limiter::{ConcurrencyLimiter, FlightPermit};
use crate::metrics::BulkMetrics;
use crate::report::{BatchFailure, BatchOutcome, BatchReport};

/// Counts batches between launch and terminal state. `wait_idle`
/// parks on the notify until the count returns to zero.
#[derive(Debug, Default)]
pub struct FlightTracker {
    active: AtomicUsize,
    drained: Notify,
}

impl FlightTracker {
    fn begin(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolve once no batches are in flight.
    pub async fn wait_empty(&self) {
        loop {
            // Register for the notification before re-checking, so a
            // final `end` between the check and the park is not missed.
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A sealed batch bound to its flight slot
struct InFlight {
    batch: Batch,
    trigger: FlushTrigger,
    permit: FlightPermit,
    launched_at: Instant,
}

/// Submits batches, interprets outcomes, and owns the retry loop
pub struct Dispatcher {
    connection: Arc<dyn ClusterConnection>,
    limiter: ConcurrencyLimiter,
    retry: RetryPolicy,
    limits: BufferLimits,
    reports: mpsc::UnboundedSender<BatchReport>,
    metrics: Arc<BulkMetrics>,
    tracker: Arc<FlightTracker>,
}

impl Dispatcher {
    pub fn new(
        connection: Arc<dyn ClusterConnection>,
        limiter: ConcurrencyLimiter,
        retry: RetryPolicy,
        limits: BufferLimits,
        reports: mpsc::UnboundedSender<BatchReport>,
        metrics: Arc<BulkMetrics>,
        tracker: Arc<FlightTracker>,
    ) -> Self {
        Self {
            connection,
            limiter,
            retry,
            limits,
            reports,
            metrics,
            tracker,
        }
    }

    /// Reserve a flight slot, waiting up to `wait_bound`.
    pub async fn admit(&self, wait_bound: Option<Duration>) -> BalerResult<FlightPermit> {
        self.limiter.acquire(wait_bound).await
    }

    /// Spawn the submission task for a sealed batch. The permit must
    /// already be held; it travels with the task and is released only
    /// when the batch reaches a terminal state.
    pub fn launch(
        &self,
        batch: Batch,
        trigger: FlushTrigger,
        permit: FlightPermit,
    ) -> BalerResult<()> {
        self.verify_caps(&batch)?;

        debug!(
            batch_id = %batch.id(),
            operations = batch.len(),
            bytes = batch.bytes(),
            trigger = trigger.as_str(),
            buffered_for = ?batch.age(),
            "launching batch"
        );
        self.metrics
            .record_dispatch(batch.len() as u64, batch.bytes() as u64);
        self.metrics.flight_started();
        self.tracker.begin();

        let flight = InFlight {
            batch,
            trigger,
            permit,
            launched_at: Instant::now(),
        };
        let connection = Arc::clone(&self.connection);
        let retry = self.retry.clone();
        let reports = self.reports.clone();
        let metrics = Arc::clone(&self.metrics);
        let tracker = Arc::clone(&self.tracker);

        tokio::spawn(async move {
            let report = drive(connection, retry, &metrics, flight).await;
            match report.outcome {
                BatchOutcome::Succeeded => metrics.record_success(),
                BatchOutcome::Failed(_) => metrics.record_failure(),
            }
            // The report goes out before the idle signal, so a caller
            // woken by `wait_idle` sees every terminal batch on the
            // channel. The receiver may already be gone at teardown.
            let _ = reports.send(report);
            metrics.flight_finished();
            tracker.end();
        });

        Ok(())
    }

    /// Report a batch shutdown could not dispatch. The loss stays
    /// visible: it counts as a failure and lands on the report channel.
    pub fn report_abandoned(&self, batch: Batch, trigger: FlushTrigger) {
        warn!(
            batch_id = %batch.id(),
            operations = batch.len(),
            "abandoning undispatched batch"
        );
        self.metrics.record_failure();
        let _ = self.reports.send(BatchReport {
            batch_id: batch.id(),
            trigger,
            operations: batch.len(),
            bytes: batch.bytes(),
            operation_ids: batch.operation_ids(),
            attempts: 0,
            elapsed: Duration::ZERO,
            outcome: BatchOutcome::Failed(BatchFailure::Abandoned),
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.active()
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    // Invariant check at the dispatch boundary. The buffer's sealing
    // rules make a violation unreachable; only a singleton may exceed
    // the volume cap.
    fn verify_caps(&self, batch: &Batch) -> BalerResult<()> {
        let count_ok = batch.len() <= self.limits.max_actions;
        let volume_ok = batch.bytes() <= self.limits.max_volume || batch.len() == 1;
        if count_ok && volume_ok {
            return Ok(());
        }
        Err(BalerError::BufferOverflow {
            operations: batch.len(),
            bytes: batch.bytes(),
            max_actions: self.limits.max_actions,
            max_volume: self.limits.max_volume,
        })
    }
}

/// Retry loop for one batch. The flight permit stays held on every
/// path until the batch is terminal.
async fn drive(
    connection: Arc<dyn ClusterConnection>,
    retry: RetryPolicy,
    metrics: &BulkMetrics,
    flight: InFlight,
) -> BatchReport {
    let InFlight {
        batch,
        trigger,
        permit,
        launched_at,
    } = flight;
    let mut attempts = 0u32;

    let outcome = loop {
        attempts += 1;
        debug!(batch_id = %batch.id(), attempt = attempts, "submitting batch");

        match connection.submit(&batch).await {
            SubmitOutcome::Success => {
                debug!(
                    batch_id = %batch.id(),
                    attempts,
                    elapsed = ?launched_at.elapsed(),
                    "batch acknowledged"
                );
                break BatchOutcome::Succeeded;
            }
            SubmitOutcome::Retryable(condition) => {
                if attempts >= retry.max_attempts {
                    error!(
                        batch_id = %batch.id(),
                        attempts,
                        %condition,
                        "giving up on batch, retries exhausted"
                    );
                    break BatchOutcome::Failed(BatchFailure::RetriesExhausted {
                        attempts,
                        condition,
                    });
                }

                // A cluster that probes as down gets the full backoff
                // cap instead of the early exponential steps.
                let delay = if connection.is_available().await {
                    retry.delay(attempts)
                } else {
                    retry.max_delay
                };
                warn!(
                    batch_id = %batch.id(),
                    attempt = attempts,
                    max_attempts = retry.max_attempts,
                    %condition,
                    ?delay,
                    "transient submission failure, backing off"
                );
                metrics.record_retry();
                sleep(delay).await;
            }
            SubmitOutcome::Fatal(reason) => {
                error!(
                    batch_id = %batch.id(),
                    attempts,
                    reason = %reason,
                    "batch rejected permanently"
                );
                break BatchOutcome::Failed(BatchFailure::Rejected(reason));
            }
        }
    };

    let report = BatchReport {
        batch_id: batch.id(),
        trigger,
        operations: batch.len(),
        bytes: batch.bytes(),
        operation_ids: batch.operation_ids(),
        attempts,
        elapsed: launched_at.elapsed(),
        outcome,
    };

    // Terminal state reached; the slot goes back to the pool.
    drop(permit);
    report
}
