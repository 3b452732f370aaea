//! Construction-time configuration for the bulk client
//!
//! All limits are fixed when the client is built; there is no runtime
//! mutation. The defaults match common bulk-ingest practice: requests
//! of up to 10k actions or 10 MB, twice the host parallelism in
//! flight, and a five second latency bound for a quiet buffer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BalerError, BalerResult};

/// Tuning knobs for batching, concurrency, and retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Maximum number of operations in a single bulk request
    pub max_actions_per_request: usize,
    /// Maximum estimated bytes in a single bulk request
    pub max_volume_per_request: usize,
    /// Maximum number of bulk requests in flight at once
    pub max_concurrent_requests: usize,
    /// Upper bound on how long an operation sits buffered before the
    /// timer flushes it
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// How long `add`/`flush` wait for a flight slot before failing
    /// with `ResourceExhausted`; `None` waits for as long as it takes
    #[serde(default, with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    /// How long `shutdown` waits for in-flight requests to settle
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Retry behavior for transient submission failures
    pub retry: RetryPolicy,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_actions_per_request: 10_000,
            max_volume_per_request: 10 * 1024 * 1024,
            max_concurrent_requests: default_concurrency(),
            flush_interval: Duration::from_secs(5),
            acquire_timeout: None,
            shutdown_grace: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl BulkConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> BalerResult<()> {
        if self.max_actions_per_request == 0 {
            return Err(config_error("max_actions_per_request", "must be at least 1"));
        }
        if self.max_volume_per_request == 0 {
            return Err(config_error("max_volume_per_request", "must be at least 1"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(config_error("max_concurrent_requests", "must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(config_error("flush_interval", "must be non-zero"));
        }
        self.retry.validate()
    }
}

/// Twice the available parallelism, the conventional sizing for a
/// network-bound bulk pipeline.
fn default_concurrency() -> usize {
    num_cpus::get().saturating_mul(2).max(1)
}

/// Backoff policy for retrying transient submission failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total submission attempts per batch, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Cap on the computed delay; also the delay used when the
    /// availability probe reports the cluster down
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Exponential growth factor between retries
    pub multiplier: f64,
    /// Randomize each delay into the 0.5x..1.5x range so retrying
    /// clients do not synchronize
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn validate(&self) -> BalerResult<()> {
        if self.max_attempts == 0 {
            return Err(config_error("retry.max_attempts", "must be at least 1"));
        }
        if self.multiplier < 1.0 {
            return Err(config_error("retry.multiplier", "must be at least 1.0"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based): exponential in
    /// the attempt, capped at `max_delay`, optionally jittered.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powf(attempt.saturating_sub(1) as f64);
        let delay_ms = (self.base_delay.as_millis() as f64 * factor) as u64;
        let delay = std::cmp::min(Duration::from_millis(delay_ms), self.max_delay);
        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    use rand::Rng;
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

fn config_error(field: &str, message: &str) -> BalerError {
    BalerError::Configuration {
        field: field.to_string(),
        message: message.to_string(),
    }
}
