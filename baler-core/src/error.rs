//! Error types shared across the buffering and dispatch layers
//!
//! Transient transport conditions are not errors here: they travel as
//! data inside `SubmitOutcome` and only become a `BalerError` once the
//! dispatcher has spent its retry budget.

use std::time::Duration;

use thiserror::Error;

use crate::connection::TransportCondition;

/// Result alias used throughout the crate
pub type BalerResult<T> = Result<T, BalerError>;

/// Failures surfaced by the bulk engine
#[derive(Error, Debug)]
pub enum BalerError {
    /// All flight slots stayed occupied past the configured wait bound
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    /// Every submission attempt hit a transient transport condition
    #[error("Retries exhausted after {attempts} attempts: {condition}")]
    RetriesExhausted {
        attempts: u32,
        condition: TransportCondition,
    },

    /// The remote store rejected the batch permanently
    #[error("Batch rejected by cluster: {reason}")]
    BatchRejected { reason: String },

    /// A batch reached the dispatcher above the configured caps.
    /// Unreachable through the buffer's sealing rules; hitting it
    /// means a bug upstream, not an environmental failure.
    #[error(
        "Buffer overflow: batch of {operations} operations / {bytes} bytes \
         exceeds caps of {max_actions} operations / {max_volume} bytes"
    )]
    BufferOverflow {
        operations: usize,
        bytes: usize,
        max_actions: usize,
        max_volume: usize,
    },

    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The client has been shut down
    #[error("Bulk client is closed")]
    Closed,

    #[error("Configuration error in {field}: {message}")]
    Configuration { field: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BalerError {
    /// True for failures a caller may reasonably resolve by waiting
    /// and trying again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BalerError::ResourceExhausted { .. } | BalerError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportCondition;

    #[test]
    fn test_display_includes_context() {
        let err = BalerError::RetriesExhausted {
            attempts: 3,
            condition: TransportCondition::NoNodeAvailable,
        };
        assert_eq!(
            err.to_string(),
            "Retries exhausted after 3 attempts: no node available"
        );

        let err = BalerError::Configuration {
            field: "max_actions_per_request".to_string(),
            message: "must be at least 1".to_string(),
        };
        assert!(err.to_string().contains("max_actions_per_request"));
    }

    #[test]
    fn test_transient_classification() {
        let exhausted = BalerError::ResourceExhausted {
            resource: "bulk request slots".to_string(),
        };
        assert!(exhausted.is_transient());
        assert!(!BalerError::Closed.is_transient());
    }
}
