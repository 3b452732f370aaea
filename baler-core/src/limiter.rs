//! Bounds the number of bulk requests in flight

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::error::{BalerError, BalerResult};

/// A held flight slot.
///
/// Dropping the permit returns the slot, so a batch task cannot leak
/// concurrency on any exit path. The dispatcher holds one permit per
/// batch from before the seal until the batch is terminal; retries
/// reuse it rather than reacquiring.
#[derive(Debug)]
pub struct FlightPermit {
    _permit: OwnedSemaphorePermit,
}

/// Counting permit pool sized `max_concurrent_requests`
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a flight slot. A `wait_bound` of `None` waits for as
    /// long as it takes; otherwise the wait fails with
    /// `ResourceExhausted` once the bound elapses.
    pub async fn acquire(&self, wait_bound: Option<Duration>) -> BalerResult<FlightPermit> {
        let permit = match wait_bound {
            None => self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| closed_error())?,
            Some(bound) => match timeout(bound, self.semaphore.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(closed_error()),
                Err(_) => {
                    return Err(BalerError::ResourceExhausted {
                        resource: format!("bulk request slots (all {} in use)", self.capacity),
                    })
                }
            },
        };
        Ok(FlightPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held by launched or pending batches.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }
}

// The semaphore is never closed; an AcquireError still must not panic
// the engine.
fn closed_error() -> BalerError {
    BalerError::Internal {
        message: "concurrency limiter semaphore closed".to_string(),
    }
}
