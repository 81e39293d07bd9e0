//! A sink backed by the `metrics` facade, with an optional Prometheus exporter.
//!
//! Metric names are flattened for Prometheus: the sink prefix is prepended
//! and every `.` becomes `_`, so `http.request.count` under `ecommerce.`
//! becomes `ecommerce_http_request_count`. Global tags become labels.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_histogram, histogram, Label};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::PrometheusConfig;
use crate::error::{SinkError, TelemetryError};
use crate::names;
use crate::sink::{MetricsSink, Tag};
use crate::TelemetryResult;

/// Global Prometheus handle for rendering.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Forwards metrics to whatever recorder is installed in the `metrics` facade.
#[derive(Debug)]
pub struct RecorderSink {
    prefix: String,
    global_labels: Vec<Label>,
    closed: AtomicBool,
}

impl RecorderSink {
    /// Creates a sink with the given name prefix and process-wide tags.
    pub fn new(prefix: &str, global_tags: &[Tag]) -> Self {
        Self {
            prefix: prefix.to_string(),
            global_labels: global_tags.iter().map(to_label).collect(),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers descriptions for the standard request metrics.
    pub fn describe(&self) {
        describe_counter!(
            self.metric_name(names::REQUEST_COUNT),
            "Total number of completed HTTP requests"
        );
        describe_histogram!(
            self.metric_name(names::REQUEST_DURATION_MS),
            metrics::Unit::Milliseconds,
            "HTTP request duration in milliseconds"
        );
        describe_histogram!(
            self.metric_name(names::RESPONSE_BYTES),
            metrics::Unit::Bytes,
            "HTTP response body size in bytes"
        );
        describe_counter!(
            self.metric_name(names::CLIENT_ERROR),
            "Requests completed with a 4xx status"
        );
        describe_counter!(
            self.metric_name(names::SERVER_ERROR),
            "Requests completed with a 5xx status"
        );
        describe_counter!(
            self.metric_name(names::APP_STARTED),
            "Process start events"
        );
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}{name}", self.prefix).replace('.', "_")
    }

    fn labels(&self, tags: &[Tag]) -> Vec<Label> {
        tags.iter()
            .map(to_label)
            .chain(self.global_labels.iter().cloned())
            .collect()
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }
}

fn to_label(tag: &Tag) -> Label {
    Label::new(tag.key().to_string(), tag.value().to_string())
}

impl MetricsSink for RecorderSink {
    fn increment(&self, name: &str, value: u64, tags: &[Tag]) -> Result<(), SinkError> {
        self.ensure_open()?;
        counter!(self.metric_name(name), self.labels(tags)).increment(value);
        Ok(())
    }

    fn distribution(&self, name: &str, value: f64, tags: &[Tag]) -> Result<(), SinkError> {
        self.ensure_open()?;
        if !value.is_finite() {
            return Err(SinkError::Rejected(format!("{name}: non-finite value {value}")));
        }
        histogram!(self.metric_name(name), self.labels(tags)).record(value);
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Installs the Prometheus exporter as the global `metrics` recorder and
/// starts its scrape listener on the current Tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` when called outside a runtime, when the
/// listener cannot bind, or when a recorder is already installed.
pub fn install_prometheus(config: &PrometheusConfig) -> TelemetryResult<()> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
        TelemetryError::MetricsInit("Prometheus exporter requires a Tokio runtime".to_string())
    })?;

    let (recorder, exporter) = {
        let _enter = runtime.enter();
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .build()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
    };

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let _ = PROMETHEUS_HANDLE.set(handle);

    runtime.spawn(async move {
        if let Err(e) = exporter.await {
            tracing::warn!(error = ?e, "Prometheus exporter stopped");
        }
    });

    tracing::info!(addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if the exporter is not installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}
