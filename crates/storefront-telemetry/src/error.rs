//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize a metrics backend.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to parse or resolve an address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The StatsD client could not be built.
    #[error("StatsD client error: {0}")]
    Statsd(#[from] cadence::MetricError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`MetricsSink`](crate::MetricsSink) when a metric
/// cannot be handed to its transport.
///
/// Metrics are best-effort telemetry: callers log these and move on.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The transport refused or failed the write.
    #[error("failed to emit metric {metric}: {source}")]
    Emission {
        /// Fully qualified metric name (prefix included).
        metric: String,
        /// Underlying transport error.
        #[source]
        source: std::io::Error,
    },

    /// The StatsD client refused the metric.
    #[error("failed to emit metric {metric}: {source}")]
    Client {
        /// Fully qualified metric name (prefix included).
        metric: String,
        /// Client error.
        #[source]
        source: cadence::MetricError,
    },

    /// The sink was closed and no longer accepts metrics.
    #[error("metrics sink is closed")]
    Closed,

    /// The sink rejected the metric for a non-transport reason.
    #[error("metric rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Creates an emission error for the given metric.
    pub fn emission(metric: impl Into<String>, source: std::io::Error) -> Self {
        Self::Emission {
            metric: metric.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::MetricsInit("failed".to_string());
        assert_eq!(err.to_string(), "Failed to initialize metrics: failed");
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::emission(
            "ecommerce.http.request.count",
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "socket busy"),
        );
        assert_eq!(
            err.to_string(),
            "failed to emit metric ecommerce.http.request.count: socket busy"
        );
        assert_eq!(SinkError::Closed.to_string(), "metrics sink is closed");
    }

    #[test]
    fn test_sink_error_source() {
        use std::error::Error as _;

        let err = SinkError::emission("m", std::io::Error::other("boom"));
        assert!(err.source().is_some());
        assert!(SinkError::Rejected("bad".into()).source().is_none());
    }
}
