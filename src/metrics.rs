//! Production observability metrics.
//!
//! Counter emission is fire-and-forget through the `metrics` facade; without
//! an installed recorder the macros are no-ops, so library callers pay
//! nothing unless the binary opts in to the Prometheus exporter.

use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing::info;

static METRICS_INSTALLED: OnceCell<()> = OnceCell::new();

/// Install the Prometheus exporter and register metric descriptions.
///
/// Idempotent: repeated calls after a successful install are no-ops.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g. "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INSTALLED.get().is_some() {
        return Ok(());
    }

    info!("Initializing metrics exporter on {}", addr);
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "ingest_calls_total",
        Unit::Count,
        "Remote calls issued, by endpoint"
    );
    describe_counter!(
        "ingest_retries_total",
        Unit::Count,
        "Page retry attempts, by endpoint"
    );
    describe_counter!(
        "ingest_throttle_events_total",
        Unit::Count,
        "Remote rate-limit signals received, by endpoint"
    );
    describe_counter!(
        "ingest_batches_total",
        Unit::Count,
        "Batch outcomes, by dataset and status"
    );
    describe_counter!(
        "ingest_rows_persisted_total",
        Unit::Count,
        "Rows confirmed persisted, by dataset"
    );

    let _ = METRICS_INSTALLED.set(());
    Ok(())
}

/// Record one remote call.
pub fn record_call(endpoint: &str) {
    counter!("ingest_calls_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record one retry attempt.
pub fn record_retry(endpoint: &str) {
    counter!("ingest_retries_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record one remote throttle signal.
pub fn record_throttle(endpoint: &str) {
    counter!("ingest_throttle_events_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Record one batch outcome.
pub fn record_batch(dataset: &str, status: &str) {
    counter!(
        "ingest_batches_total",
        "dataset" => dataset.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record rows confirmed persisted.
pub fn record_rows(dataset: &str, rows: u64) {
    counter!("ingest_rows_persisted_total", "dataset" => dataset.to_string()).increment(rows);
}
