//! Structured logging setup.
//!
//! Logs carry consistent fields so they can be shipped and parsed:
//! - `timestamp`: ISO 8601 timestamp
//! - `level`: Log level (trace, debug, info, warn, error)
//! - `target`: Emitting module
//! - `message`: Log message
//! - Additional context fields (`kind`, `import_uuid`, `tenant_id`, ...)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level {:?}: {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if !config.console_output {
        registry.try_init()
    } else if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging configured"
    );
    Ok(())
}

/// Install a test writer subscriber, ignoring a second installation.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Helper to create structured log entries carrying the run identifier.
#[macro_export]
macro_rules! log_event {
    (info, $import_uuid:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            import_uuid = %$import_uuid,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $import_uuid:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            import_uuid = %$import_uuid,
            $($($field)*,)?
            $msg
        )
    };

    (error, $import_uuid:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            import_uuid = %$import_uuid,
            $($($field)*,)?
            $msg
        )
    };
}
