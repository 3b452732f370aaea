//! The interface to the remote clustered store
//!
//! The engine never opens sockets itself. Callers hand it anything
//! implementing [`ClusterConnection`]; node discovery, transport
//! setup, and authentication all live behind that trait.

use async_trait::async_trait;

use crate::batch::Batch;

/// Transient failure classes a submission can hit.
///
/// These are data, not control flow: the dispatcher decides retry
/// behavior by matching on them, and they end up verbatim in reports
/// when the retry budget runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCondition {
    /// The configured host could not be resolved or reached
    HostUnreachable,
    /// The cluster answered but no node is currently serving requests
    NoNodeAvailable,
    /// Any other transient transport error
    Other(String),
}

impl std::fmt::Display for TransportCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportCondition::HostUnreachable => write!(f, "host unreachable"),
            TransportCondition::NoNodeAvailable => write!(f, "no node available"),
            TransportCondition::Other(detail) => {
                write!(f, "transient transport error: {}", detail)
            }
        }
    }
}

/// Outcome of one batch submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The store accepted every operation in the batch
    Success,
    /// Transient failure; the dispatcher may retry the same batch
    Retryable(TransportCondition),
    /// Permanent rejection; retrying cannot help
    Fatal(String),
}

/// Submission interface to the remote clustered store.
///
/// `submit` must classify failures as retryable or fatal rather than
/// folding them into one error. `is_available` is a best-effort
/// liveness probe the dispatcher consults between retries; it must
/// never block for long.
#[async_trait]
pub trait ClusterConnection: Send + Sync {
    async fn submit(&self, batch: &Batch) -> SubmitOutcome;

    async fn is_available(&self) -> bool;
}
