//! # Relocation Telemetry
//!
//! Logging and metrics for the relocation import engine.
//!
//! ## Components
//!
//! - **Logging**: `tracing` events rendered by `tracing-subscriber` (text or JSON)
//! - **Metrics**: Prometheus counters and histograms in a private registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relocation_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! fn main() -> Result<(), relocation_telemetry::TelemetryError> {
//!     init_logging(&TelemetryConfig::from_env())?;
//!     let _metrics = register_metrics()?;
//!
//!     // Imports run here
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `relocation` | Service name in logs |
//! | `RELOCATION_LOG_LEVEL` | `info` | Log level filter |
//! | `RELOCATION_JSON_LOGS` | `false` | JSON log lines |
//! | `RELOCATION_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, CONTROL_REPLICAS,
    IMPORT_BATCHES, IMPORT_BATCH_DURATION, IMPORT_RECORDS_DROPPED, NAMING_COMMITS,
    OUTBOX_DRAIN_RETRIES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// A configuration value could not be used.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
