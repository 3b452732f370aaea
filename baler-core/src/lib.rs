//! Client-side bulk-write engine: buffers many small index, update,
//! and delete operations and flushes them to a remote clustered store
//! as bounded batched requests, with capped in-flight concurrency and
//! retry of transient transport failures.

pub mod batch;
pub mod buffer;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod operation;
pub mod report;

// Timer wiring over the client internals; not part of the public
// surface.
mod scheduler;
