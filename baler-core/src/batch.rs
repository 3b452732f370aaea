//! Sealed groups of operations dispatched as one bulk request

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::operation::{Operation, OperationId};

/// Why a batch was sealed and handed to the dispatcher.
///
/// Carried through logs, reports, and tests; correctness never depends
/// on the tag itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// The operation-count cap was reached
    Count,
    /// The byte-volume cap was reached
    Volume,
    /// The interval timer fired
    Time,
    /// The caller invoked `flush`
    Manual,
    /// Final drain during shutdown
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Count => "count",
            FlushTrigger::Volume => "volume",
            FlushTrigger::Time => "time",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// An ordered group of operations bound for a single bulk submission.
///
/// A batch grows inside the request buffer and is sealed the moment it
/// is handed to the dispatcher; sealed batches are immutable and owned
/// by exactly one in-flight task. Operation order is preserved because
/// the remote store may apply per-key operations in sequence.
#[derive(Debug)]
pub struct Batch {
    id: Uuid,
    operations: Vec<Operation>,
    bytes: usize,
    created_at: Instant,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            operations: Vec::new(),
            bytes: 0,
            created_at: Instant::now(),
        }
    }

    pub(crate) fn push(&mut self, op: Operation) {
        // Age is measured from the first operation, not from when the
        // empty batch was allocated, which may be much earlier.
        if self.operations.is_empty() {
            self.created_at = Instant::now();
        }
        self.bytes += op.estimated_size();
        self.operations.push(op);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Sum of the estimated sizes of all contained operations.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Time since the first operation entered this batch.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation_ids(&self) -> Vec<OperationId> {
        self.operations.iter().map(|op| op.id()).collect()
    }
}
