//! The bulk client facade
//!
//! `BulkClient` composes the buffer, limiter, dispatcher, and timer
//! behind four calls: `add`, `flush`, `wait_idle`, `shutdown`.
//! Producers clone the client freely; all clones share one buffer,
//! one flight pool, and one timer.
//!
//! The admission protocol is the heart of the facade: each flight slot
//! is reserved while the buffer lock is held, before the batch it will
//! carry is sealed, and the batch launches before the next slot is
//! requested. That gives three guarantees at once. Batches launch in
//! the order they were sealed, because at most one caller ever waits
//! on the slot pool. A failed or cancelled reservation leaves the
//! buffer exactly as it was. And producers only ever block on
//! admission, never on submission I/O, which runs in spawned tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::batch::FlushTrigger;
use crate::buffer::{BufferLimits, RequestBuffer};
use crate::config::BulkConfig;
use crate::connection::ClusterConnection;
use crate::dispatcher::{Dispatcher, FlightTracker};
use crate::error::{BalerError, BalerResult};
use crate::limiter::ConcurrencyLimiter;
use crate::metrics::{BulkMetrics, MetricsSnapshot};
use crate::operation::Operation;
use crate::report::BatchReport;
use crate::scheduler::FlushScheduler;

/// Shared state behind every clone of [`BulkClient`]
pub(crate) struct ClientInner {
    config: BulkConfig,
    buffer: Mutex<RequestBuffer>,
    dispatcher: Dispatcher,
    tracker: Arc<FlightTracker>,
    metrics: Arc<BulkMetrics>,
    scheduler: parking_lot::Mutex<Option<FlushScheduler>>,
    closed: AtomicBool,
}

impl ClientInner {
    /// Drain the buffer and launch the result tagged `trigger`.
    /// No-op when nothing is buffered.
    pub(crate) async fn flush_with(&self, trigger: FlushTrigger) -> BalerResult<()> {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return Ok(());
        }
        // Slot first, seal second: a cancelled or failed wait leaves
        // the operations buffered for the next flush.
        let permit = self
            .dispatcher
            .admit(self.config.acquire_timeout)
            .await?;
        match buffer.seal() {
            Some(batch) => self.dispatcher.launch(batch, trigger, permit),
            None => Ok(()),
        }
    }
}

/// Client-side write-path batcher for a remote clustered store.
///
/// Built over a [`ClusterConnection`]; returns alongside a report
/// channel that carries one [`BatchReport`] per dispatched batch.
#[derive(Clone)]
pub struct BulkClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for BulkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkClient").finish_non_exhaustive()
    }
}

impl BulkClient {
    /// Validate `config`, wire up the pipeline, and start the flush
    /// timer.
    pub fn new(
        config: BulkConfig,
        connection: Arc<dyn ClusterConnection>,
    ) -> BalerResult<(Self, mpsc::UnboundedReceiver<BatchReport>)> {
        config.validate()?;

        let limits = BufferLimits {
            max_actions: config.max_actions_per_request,
            max_volume: config.max_volume_per_request,
        };
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(BulkMetrics::default());
        let tracker = Arc::new(FlightTracker::default());
        let dispatcher = Dispatcher::new(
            connection,
            ConcurrencyLimiter::new(config.max_concurrent_requests),
            config.retry.clone(),
            limits,
            report_tx,
            Arc::clone(&metrics),
            Arc::clone(&tracker),
        );

        let inner = Arc::new(ClientInner {
            buffer: Mutex::new(RequestBuffer::new(limits)),
            dispatcher,
            tracker,
            metrics,
            scheduler: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
            config,
        });

        let scheduler = FlushScheduler::spawn(Arc::clone(&inner), inner.config.flush_interval);
        *inner.scheduler.lock() = Some(scheduler);

        info!(
            max_actions = inner.config.max_actions_per_request,
            max_volume = inner.config.max_volume_per_request,
            max_concurrent = inner.config.max_concurrent_requests,
            flush_interval = ?inner.config.flush_interval,
            "bulk client started"
        );

        Ok((Self { inner }, report_rx))
    }

    /// Hand one operation to the engine.
    ///
    /// The operation joins the batch under construction. When it would
    /// cross the count or volume cap, the full batch is sealed first
    /// and dispatched; saturation backpressure therefore lands here
    /// and nowhere else. With an `acquire_timeout` configured, a
    /// saturated pool makes `add` fail with `ResourceExhausted` and
    /// the operation is not accepted.
    pub async fn add(&self, op: Operation) -> BalerResult<()> {
        let mut buffer = self.inner.buffer.lock().await;
        // Checked under the lock: shutdown marks the client closed
        // before it drains, so an add that sees the buffer after the
        // final drain also sees the closed flag and cannot strand an
        // operation there.
        self.ensure_open()?;

        if let Some(trigger) = buffer.must_seal_before(&op) {
            let permit = self
                .inner
                .dispatcher
                .admit(self.inner.config.acquire_timeout)
                .await?;
            if let Some(batch) = buffer.seal() {
                self.inner.dispatcher.launch(batch, trigger, permit)?;
            }
            // The slot wait can outlive a shutdown. The sealed batch
            // above still goes out, but the incoming operation must
            // not enter a buffer nothing will drain again.
            self.ensure_open()?;
        }

        if buffer.is_oversized(&op) {
            // Too large to ever share a batch, so it ships alone. The
            // slot is reserved before the append; a refused slot means
            // the operation was never accepted. Any batch sealed above
            // is already in flight, so this wait always terminates.
            let permit = self
                .inner
                .dispatcher
                .admit(self.inner.config.acquire_timeout)
                .await?;
            self.ensure_open()?;
            self.inner.metrics.record_accepted(1);
            buffer.append(op);
            if let Some(batch) = buffer.seal() {
                self.inner
                    .dispatcher
                    .launch(batch, FlushTrigger::Volume, permit)?;
            }
            return Ok(());
        }

        self.inner.metrics.record_accepted(1);
        buffer.append(op);
        Ok(())
    }

    /// Seal and dispatch whatever is buffered, regardless of caps.
    pub async fn flush(&self) -> BalerResult<()> {
        self.ensure_open()?;
        self.inner.flush_with(FlushTrigger::Manual).await
    }

    /// Stop the timer, dispatch everything still buffered, and wait
    /// for in-flight batches to settle.
    ///
    /// Idempotent: the first caller runs the teardown, later calls
    /// return immediately. Never blocks longer than `shutdown_grace`;
    /// work still pending at the deadline is logged, and a final batch
    /// that could not get a flight slot is reported as abandoned.
    pub async fn shutdown(&self) -> BalerResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("shutdown already performed");
            return Ok(());
        }

        info!("bulk client shutting down");
        let deadline = Instant::now() + self.inner.config.shutdown_grace;

        let scheduler = self.inner.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        self.final_drain(deadline).await;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, self.inner.tracker.wait_empty())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.inner.tracker.active(),
                grace = ?self.inner.config.shutdown_grace,
                "shutdown grace expired with batches still in flight"
            );
        } else {
            info!("bulk client drained");
        }
        Ok(())
    }

    /// Wait until nothing is buffered or in flight.
    ///
    /// Forces a manual flush first so buffered operations count as
    /// work to wait for. Fails with `Timeout` when the engine is not
    /// idle within `limit`.
    pub async fn wait_idle(&self, limit: Duration) -> BalerResult<()> {
        let settle = async {
            match self.flush().await {
                // A closed client has already drained; just wait out
                // whatever is still in flight.
                Ok(()) | Err(BalerError::Closed) => {}
                Err(e) => return Err(e),
            }
            self.inner.tracker.wait_empty().await;
            Ok(())
        };
        match tokio::time::timeout(limit, settle).await {
            Ok(result) => result,
            Err(_) => Err(BalerError::Timeout {
                operation: "wait for engine idle".to_string(),
                duration: limit,
            }),
        }
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Batches currently between launch and terminal state.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.active()
    }

    /// Operations buffered but not yet sealed.
    pub async fn pending_operations(&self) -> usize {
        self.inner.buffer.lock().await.pending_operations()
    }

    pub fn config(&self) -> &BulkConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> BalerResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(BalerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Final drain during shutdown. Both the lock wait and the slot
    /// wait are bounded by the grace deadline; shutdown must terminate
    /// even when the cluster has stalled, so an unplaceable batch is
    /// abandoned with a report instead of being dropped on the floor.
    ///
    /// A caller that holds the buffer lock past the deadline is
    /// blocked in a slot wait just ahead of sealing; once it resumes
    /// it seals and launches the pending batch itself (and `add`
    /// refuses its incoming operation), so skipping the drain here
    /// strands nothing.
    async fn final_drain(&self, deadline: Instant) {
        let wait = deadline.saturating_duration_since(Instant::now());
        let Ok(mut buffer) = tokio::time::timeout(wait, self.inner.buffer.lock()).await else {
            warn!("buffer lock not released within the shutdown grace, skipping final drain");
            return;
        };
        let Some(batch) = buffer.seal() else {
            return;
        };

        let wait = deadline.saturating_duration_since(Instant::now());
        match self.inner.dispatcher.admit(Some(wait)).await {
            Ok(permit) => {
                if let Err(e) =
                    self.inner
                        .dispatcher
                        .launch(batch, FlushTrigger::Shutdown, permit)
                {
                    warn!(error = %e, "final batch failed to launch");
                }
            }
            Err(_) => self
                .inner
                .dispatcher
                .report_abandoned(batch, FlushTrigger::Shutdown),
        }
    }
}
