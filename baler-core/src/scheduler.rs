//! Interval-driven flushing
//!
//! One background task per client turns the configured flush interval
//! into periodic drains, bounding how long an operation can sit
//! buffered no matter how quiet the producers are.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use crate::batch::FlushTrigger;
use crate::client::ClientInner;

pub(crate) struct FlushScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushScheduler {
    /// Start the timer task. Each tick drains the buffer tagged
    /// `Time`; missed ticks are skipped rather than bunched, since the
    /// contract is an upper latency bound, not exact periodicity.
    pub fn spawn(inner: Arc<ClientInner>, flush_interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // A tokio interval completes its first tick immediately;
            // consume it so the first drain happens one interval in.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("flush scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = inner.flush_with(FlushTrigger::Time).await {
                            warn!(error = %e, "interval flush failed");
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task and wait briefly for it to wind down. A task
    /// stuck mid-flush on a saturated limiter is aborted; the
    /// operations it was draining stay buffered because the drain only
    /// happens after a slot is held.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let abort = self.handle.abort_handle();
        if timeout(Duration::from_secs(1), self.handle).await.is_err() {
            warn!("flush scheduler did not stop in time, aborting");
            abort.abort();
        }
    }
}
