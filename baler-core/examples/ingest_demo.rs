//! Simulated ingest run against a flaky cluster
//!
//! Four producers push 2,500 operations each through one shared
//! client while the cluster fails roughly one submission in twenty.
//! Watch the report stream for batch sizes, triggers, and retry
//! counts, then compare the final counters printed at the end.
//!
//! Run with: cargo run --example ingest_demo

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use baler_core::batch::Batch;
use baler_core::client::BulkClient;
use baler_core::config::BulkConfig;
use baler_core::connection::{ClusterConnection, SubmitOutcome, TransportCondition};
use baler_core::operation::Operation;
use baler_core::report::BatchReport;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Answers after a short delay and fails one submission in twenty
/// with a transient condition.
struct SimulatedCluster {
    latency: Duration,
}

#[async_trait]
impl ClusterConnection for SimulatedCluster {
    async fn submit(&self, _batch: &Batch) -> SubmitOutcome {
        tokio::time::sleep(self.latency).await;
        if rand::thread_rng().gen_bool(0.05) {
            SubmitOutcome::Retryable(TransportCondition::NoNodeAvailable)
        } else {
            SubmitOutcome::Success
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Log every report until the client tears the channel down, then
/// hand back the success/failure tally.
async fn watch_reports(mut reports: mpsc::UnboundedReceiver<BatchReport>) -> (usize, usize) {
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    while let Some(report) = reports.recv().await {
        if report.is_success() {
            succeeded += 1;
            info!(
                batch_id = %report.batch_id,
                operations = report.operations,
                bytes = report.bytes,
                trigger = report.trigger.as_str(),
                attempts = report.attempts,
                "batch acknowledged"
            );
        } else {
            failed += 1;
            warn!(
                batch_id = %report.batch_id,
                outcome = ?report.outcome,
                "batch failed"
            );
        }
    }
    (succeeded, failed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,baler_core=debug")),
        )
        .init();

    let config = BulkConfig {
        max_actions_per_request: 500,
        max_volume_per_request: 256 * 1024,
        max_concurrent_requests: 4,
        flush_interval: Duration::from_millis(500),
        ..Default::default()
    };
    let connection = Arc::new(SimulatedCluster {
        latency: Duration::from_millis(20),
    });
    let (client, reports) = BulkClient::new(config, connection)?;
    let reporter = tokio::spawn(watch_reports(reports));

    info!("starting 4 producers, 2500 operations each");
    let started = Instant::now();

    let mut producers = Vec::new();
    for p in 0..4 {
        let client = client.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..2500u32 {
                let key = format!("p{}-doc-{}", p, i);
                let payload = format!("{{\"producer\":{},\"seq\":{}}}", p, i);
                client
                    .add(Operation::index(key, payload.into_bytes()))
                    .await?;
            }
            anyhow::Ok(())
        }));
    }
    for producer in futures::future::join_all(producers).await {
        producer??;
    }

    client.wait_idle(Duration::from_secs(30)).await?;
    info!(elapsed = ?started.elapsed(), "ingest drained");
    println!("{}", serde_json::to_string_pretty(&client.stats())?);

    client.shutdown().await?;
    drop(client);

    let (succeeded, failed) = reporter.await?;
    info!(succeeded, failed, "report stream closed");
    Ok(())
}
