//! Write operations accepted by the bulk client
//!
//! An operation is one document-level write intent. It is immutable
//! once created; ownership moves into the active batch on
//! `BulkClient::add`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Fixed per-operation overhead added to size estimates, covering the
/// action header the remote store parses in front of each payload.
const OPERATION_OVERHEAD: usize = 64;

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned to every operation.
///
/// Ids are echoed in batch reports so callers can account for each
/// operation they handed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// The kind of write an operation performs against the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Index,
    Update,
    Delete,
}

/// A single write intent against the remote store
#[derive(Debug, Clone)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    key: String,
    payload: Bytes,
}

impl Operation {
    /// Index (create or replace) the document at `key`.
    pub fn index(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(OperationKind::Index, key, payload)
    }

    /// Partially update the document at `key`.
    pub fn update(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::new(OperationKind::Update, key, payload)
    }

    /// Delete the document at `key`. Deletes carry no payload.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, key, Bytes::new())
    }

    fn new(kind: OperationKind, key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: OperationId::next(),
            kind,
            key: key.into(),
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Estimated size of this operation on the wire, counted against
    /// the batch volume cap.
    pub fn estimated_size(&self) -> usize {
        OPERATION_OVERHEAD + self.key.len() + self.payload.len()
    }
}
