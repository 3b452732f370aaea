//! Per-batch outcome records
//!
//! Failures never surface through the producer's `add` call, which may
//! have returned long before the batch went out. Instead every batch
//! handed to the dispatcher produces exactly one [`BatchReport`] on
//! the channel returned by `BulkClient::new`.

use std::time::Duration;

use uuid::Uuid;

use crate::batch::FlushTrigger;
use crate::connection::TransportCondition;
use crate::error::{BalerError, BalerResult};
use crate::operation::OperationId;

/// Terminal failure classes for a dispatched batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailure {
    /// Every attempt hit a transient condition and the budget is spent
    RetriesExhausted {
        attempts: u32,
        condition: TransportCondition,
    },
    /// The store rejected the batch permanently
    Rejected(String),
    /// Shutdown ran out of grace before the batch could be dispatched
    Abandoned,
}

/// Final state of one dispatched batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded,
    Failed(BatchFailure),
}

/// One record per batch, delivered once the batch is terminal
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub trigger: FlushTrigger,
    /// Operation count of the batch
    pub operations: usize,
    /// Estimated byte size of the batch
    pub bytes: usize,
    /// Ids of every contained operation, in insertion order
    pub operation_ids: Vec<OperationId>,
    /// Submission attempts performed, including the first
    pub attempts: u32,
    /// Time from launch to terminal state
    pub elapsed: Duration,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Succeeded)
    }

    /// Collapse the outcome into a `Result` for consumers that funnel
    /// reports into `?`-style error handling.
    pub fn into_result(self) -> BalerResult<()> {
        match self.outcome {
            BatchOutcome::Succeeded => Ok(()),
            BatchOutcome::Failed(BatchFailure::RetriesExhausted {
                attempts,
                condition,
            }) => Err(BalerError::RetriesExhausted {
                attempts,
                condition,
            }),
            BatchOutcome::Failed(BatchFailure::Rejected(reason)) => {
                Err(BalerError::BatchRejected { reason })
            }
            BatchOutcome::Failed(BatchFailure::Abandoned) => Err(BalerError::Closed),
        }
    }
}
