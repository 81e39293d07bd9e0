//! Metrics sinks and structured logging for Storefront.
//!
//! This crate owns everything that leaves the process as telemetry:
//!
//! - **Sinks**: the [`MetricsSink`] trait, a DogStatsD sink on the `cadence`
//!   client ([`StatsdSink`]), a `metrics`-facade sink with an optional Prometheus
//!   exporter ([`RecorderSink`]), and [`FanoutSink`] / [`NoopSink`].
//! - **Logging**: `tracing-subscriber` bootstrap with JSON or pretty output.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Storefront service                    │
//! │                                                          │
//! │   request metrics stage ──► SharedSink (Arc<dyn Sink>)   │
//! │                                 │                        │
//! │                       ┌─────────┴─────────┐              │
//! │                       ▼                   ▼              │
//! │                  StatsdSink          RecorderSink        │
//! └───────────────────────┼───────────────────┼──────────────┘
//!                         ▼                   ▼
//!                   DogStatsD agent      Prometheus /metrics
//!                   (UDP, :8125)
//! ```
//!
//! # Standard Metrics
//!
//! | Metric | Type | Tags |
//! |--------|------|------|
//! | `http.request.count` | Counter | `method`, `route`, `status_code`, `status_family` |
//! | `http.request.duration_ms` | Distribution | same |
//! | `http.response.bytes` | Distribution | same |
//! | `http.request.client_error` | Counter | same |
//! | `http.request.server_error` | Counter | same |
//! | `app.started` | Counter | global tags only |
//!
//! Every sink adds the global tags `env`, `service` and `version`.
//!
//! # Example
//!
//! ```rust,ignore
//! use storefront_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("ecommerce-backend")
//!     .environment("production")
//!     .statsd_agent("datadog-agent", 8125)
//!     .build();
//!
//! let mut guard = init_telemetry(config)?;
//! let sink = guard.sink();
//! // hand `sink` to the request metrics stage...
//! guard.shutdown();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod recorder;
pub mod sink;
pub mod statsd;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

pub use config::{PrometheusConfig, SampleType, StatsdConfig, TelemetryConfig, TelemetryConfigBuilder};
pub use error::{SinkError, TelemetryError};
pub use logging::{init_logging, LogConfig};
pub use recorder::{install_prometheus, render_metrics, RecorderSink};
pub use sink::{FanoutSink, MetricsSink, NoopSink, SharedSink, Tag};
pub use statsd::StatsdSink;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Standard metric names, without the sink prefix.
pub mod names {
    /// Completed requests.
    pub const REQUEST_COUNT: &str = "http.request.count";
    /// Request latency in milliseconds.
    pub const REQUEST_DURATION_MS: &str = "http.request.duration_ms";
    /// Response body size in bytes.
    pub const RESPONSE_BYTES: &str = "http.response.bytes";
    /// Requests answered with a 4xx status.
    pub const CLIENT_ERROR: &str = "http.request.client_error";
    /// Requests answered with a 5xx status.
    pub const SERVER_ERROR: &str = "http.request.server_error";
    /// Emitted once when the process has started.
    pub const APP_STARTED: &str = "app.started";
}

/// Guard that owns the shared sink.
///
/// Keep it alive for the lifetime of the application. Shutting it down (or
/// dropping it) stops the periodic flush task and closes the sink, draining
/// any buffered metrics.
pub struct TelemetryGuard {
    sink: SharedSink,
    flush_task: Option<tokio::task::JoinHandle<()>>,
    closed: bool,
}

impl TelemetryGuard {
    /// Creates a guard around an existing sink.
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink,
            flush_task: None,
            closed: false,
        }
    }

    /// Returns a handle to the shared sink.
    #[must_use]
    pub fn sink(&self) -> SharedSink {
        Arc::clone(&self.sink)
    }

    /// Closes the sink. Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(task) = self.flush_task.take() {
            task.abort();
        }
        if let Err(e) = self.sink.close() {
            tracing::warn!(error = %e, "failed to close metrics sink");
        }
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("flush_task", &self.flush_task.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds the sink described by `config` without touching logging.
///
/// Enabled backends are combined with a [`FanoutSink`]; with none enabled the
/// result is a [`NoopSink`]. A buffered StatsD sink gets a periodic flush
/// task when a Tokio runtime is available.
///
/// # Errors
///
/// Returns `TelemetryError` if a backend fails to initialize.
pub fn build_sink(config: &TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    let global_tags = config.global_tags();
    let mut sinks: Vec<SharedSink> = Vec::new();
    let mut flush_task = None;

    if config.statsd.enabled {
        let statsd = Arc::new(StatsdSink::new(&config.statsd, &global_tags)?);
        flush_task = statsd.spawn_flush_task(config.statsd.flush_interval);
        sinks.push(statsd);
    }

    if config.prometheus.enabled {
        install_prometheus(&config.prometheus)?;
        let recorder = RecorderSink::new(&config.statsd.prefix, &global_tags);
        recorder.describe();
        sinks.push(Arc::new(recorder));
    }

    let sink: SharedSink = match sinks.len() {
        0 => Arc::new(NoopSink),
        1 => sinks.remove(0),
        _ => Arc::new(FanoutSink::new(sinks)),
    };

    let mut guard = TelemetryGuard::new(sink);
    guard.flush_task = flush_task;
    Ok(guard)
}

/// Initializes all telemetry subsystems.
///
/// Installs logging, builds the sink, emits `app.started` once and logs a
/// ready line.
///
/// # Errors
///
/// Returns `TelemetryError` if logging or a sink backend fails to initialize.
/// A failure to emit `app.started` is only logged.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    init_logging(&config.logging)?;

    let guard = build_sink(&config)?;

    if let Err(e) = guard.sink.increment(names::APP_STARTED, 1, &[]) {
        tracing::warn!(error = %e, "failed to emit {}", names::APP_STARTED);
    }

    tracing::info!(
        env = %config.environment,
        service = %config.service_name,
        version = %config.service_version,
        statsd_enabled = config.statsd.enabled,
        agent = %format!("{}:{}", config.statsd.host, config.statsd.port),
        prometheus_enabled = config.prometheus.enabled,
        "telemetry ready"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn disabled_logging() -> LogConfig {
        LogConfig {
            enabled: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn test_guard_closes_sink_once() {
        let recording = Arc::new(RecordingSink::new());
        let mut guard = TelemetryGuard::new(recording.clone());

        guard.shutdown();
        assert!(recording.is_closed());
        guard.shutdown();
        drop(guard);
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let recording = Arc::new(RecordingSink::new());
        drop(TelemetryGuard::new(recording.clone()));
        assert!(recording.is_closed());
    }

    #[test]
    fn test_build_sink_without_backends_is_noop() {
        let mut config = TelemetryConfig::default();
        config.statsd.enabled = false;

        let guard = build_sink(&config).unwrap();
        assert!(guard.sink().increment(names::REQUEST_COUNT, 1, &[]).is_ok());
    }

    #[test]
    fn test_init_emits_app_started_with_global_tags() {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        agent
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = agent.local_addr().unwrap().port();

        let config = TelemetryConfig::builder()
            .service_name("shop")
            .service_version("9.9.9")
            .environment("test")
            .statsd_agent("127.0.0.1", port)
            .logging(disabled_logging())
            .build();

        let _guard = init_telemetry(config).unwrap();

        let mut buf = [0_u8; 512];
        let n = agent.recv(&mut buf).unwrap();
        let line = std::str::from_utf8(&buf[..n]).unwrap().trim_end();
        let (head, tags) = line.split_once("|#").unwrap();
        assert_eq!(head, "ecommerce.app.started:1|c");
        let mut tags: Vec<&str> = tags.split(',').collect();
        tags.sort_unstable();
        assert_eq!(tags, ["env:test", "service:shop", "version:9.9.9"]);
    }

    #[test]
    fn test_guard_shutdown_inside_runtime() {
        tokio_test::block_on(async {
            let recording = Arc::new(RecordingSink::new());
            let mut guard = TelemetryGuard::new(recording.clone());
            guard.shutdown();
            assert!(recording.is_closed());
        });
    }
}
