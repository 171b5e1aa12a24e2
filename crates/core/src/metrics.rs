//! Metrics definitions for the pipeline.
//!
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`. Without an installed
//! recorder every call here is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "batches_indexed_total",
        "Total number of block batches committed"
    );
    describe_counter!(
        "transfers_indexed_total",
        "Total number of transfer events committed"
    );
    describe_counter!(
        "accounts_updated_total",
        "Total number of account upserts committed"
    );
    describe_counter!(
        "decode_errors_total",
        "Total number of transfer events that could not be decoded"
    );
    describe_counter!(
        "pipeline_retries_total",
        "Total number of retried fetches and commits"
    );
    describe_histogram!(
        "batch_processing_duration_seconds",
        "Time taken to extract, aggregate and commit a batch in seconds"
    );
}

/// Record a committed batch.
///
/// # Arguments
/// * `transfers` - Number of transfers written
/// * `accounts` - Number of accounts upserted
pub fn record_batch_indexed(transfers: usize, accounts: usize) {
    counter!("batches_indexed_total").increment(1);
    counter!("transfers_indexed_total").increment(transfers as u64);
    counter!("accounts_updated_total").increment(accounts as u64);
}

/// Record a decode error for the given schema version.
pub fn record_decode_error(version: &str) {
    counter!("decode_errors_total", "version" => version.to_string()).increment(1);
}

/// Record a retry of a transient failure.
///
/// # Arguments
/// * `stage` - Where the failure happened ("chain", "cursor", "head", "fetch", "load" or "commit")
pub fn record_retry(stage: &'static str) {
    counter!("pipeline_retries_total", "stage" => stage).increment(1);
}

fn record_batch_processing_duration(duration_secs: f64) {
    histogram!("batch_processing_duration_seconds").record(duration_secs);
}

/// Times one batch; only batches that reach [`ProcessingTimer::finish`] are recorded.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the elapsed time. A timer dropped without this records nothing.
    pub fn finish(self) {
        record_batch_processing_duration(self.start.elapsed().as_secs_f64());
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}
