//! Prometheus metrics for the import engine.
//!
//! All metrics follow the naming convention: `relocation_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., import_batches_total)
//! - **Histogram**: Distribution of values (e.g., batch_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DISPATCH METRICS
    // =========================================================================

    /// Batches handed to importers
    pub static ref IMPORT_BATCHES: CounterVec = CounterVec::new(
        Opts::new("relocation_import_batches_total", "Batches handed to kind importers"),
        &["kind", "outcome"]  // outcome: imported/failed/skipped
    ).expect("metric creation failed");

    /// Batch import duration
    pub static ref IMPORT_BATCH_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "relocation_import_batch_duration_seconds",
            "Time spent in one importer call"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).expect("bucket layout"))
    ).expect("metric creation failed");

    /// Records or fields dropped while sanitizing a snapshot
    pub static ref IMPORT_RECORDS_DROPPED: CounterVec = CounterVec::new(
        Opts::new("relocation_import_dropped_total", "Snapshot content dropped before import"),
        &["reason"]  // reason: unknown_kind/unknown_field
    ).expect("metric creation failed");

    // =========================================================================
    // CROSS-DOMAIN METRICS
    // =========================================================================

    /// Chunk replicas written for control-owned kinds
    pub static ref CONTROL_REPLICAS: CounterVec = CounterVec::new(
        Opts::new("relocation_control_replicas_total", "Chunk replica bookkeeping outcomes"),
        &["outcome"]  // outcome: written/already_present
    ).expect("metric creation failed");

    /// Retried outbox drains before naming reconciliation
    pub static ref OUTBOX_DRAIN_RETRIES: Counter = Counter::new(
        "relocation_outbox_drain_retries_total",
        "Outbox shard drains that failed transiently and were retried"
    ).expect("metric creation failed");

    /// Naming commits sent to the control domain
    pub static ref NAMING_COMMITS: CounterVec = CounterVec::new(
        Opts::new("relocation_naming_commits_total", "Bulk naming commits"),
        &["outcome"]  // outcome: committed/failed
    ).expect("metric creation failed");
}

/// Handle for the metrics registry
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Dispatch
        Box::new(IMPORT_BATCHES.clone()),
        Box::new(IMPORT_BATCH_DURATION.clone()),
        Box::new(IMPORT_RECORDS_DROPPED.clone()),
        // Cross-domain
        Box::new(CONTROL_REPLICAS.clone()),
        Box::new(OUTBOX_DRAIN_RETRIES.clone()),
        Box::new(NAMING_COMMITS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
