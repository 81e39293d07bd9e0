//! Configuration schema types.
//!
//! Every section rejects unknown fields and fills missing ones from its
//! defaults, so a partial file is always valid input.

use serde::{Deserialize, Serialize};

/// HTTP server section.
///
/// # Example
///
/// ```
/// use storefront_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "0.0.0.0:8080".to_string(),
///     shutdown_timeout_secs: 30,
///     request_timeout_ms: 30000,
///     max_connections: 10000,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_max_connections() -> u32 {
    10000
}

/// Wire type for duration samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// `|h`, accepted by any StatsD server.
    #[default]
    Histogram,
    /// `|d`, Datadog distributions.
    Distribution,
}

/// DogStatsD agent section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StatsdSection {
    /// Send metrics to the agent.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Agent host.
    #[serde(default = "default_statsd_host")]
    pub host: String,

    /// Agent UDP port.
    #[serde(default = "default_statsd_port")]
    pub port: u16,

    /// Prefix prepended to every metric name.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Wire type for duration and size samples.
    #[serde(default)]
    pub sample_type: SampleKind,

    /// Datagram buffer size in bytes. 0 sends one datagram per metric.
    #[serde(default)]
    pub max_buffer_size: usize,

    /// Flush period for buffered mode, in milliseconds.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,
}

impl Default for StatsdSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_statsd_host(),
            port: default_statsd_port(),
            prefix: default_prefix(),
            sample_type: SampleKind::default(),
            max_buffer_size: 0,
            flush_interval_ms: default_flush_interval(),
        }
    }
}

fn default_statsd_host() -> String {
    "127.0.0.1".to_string()
}

fn default_statsd_port() -> u16 {
    storefront_telemetry::config::DEFAULT_STATSD_PORT
}

fn default_prefix() -> String {
    storefront_telemetry::config::DEFAULT_METRIC_PREFIX.to_string()
}

fn default_flush_interval() -> u64 {
    1000
}

/// Prometheus scrape endpoint section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PrometheusSection {
    /// Serve `/metrics` in Prometheus text format.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape endpoint address.
    #[serde(default = "default_prometheus_addr")]
    pub addr: String,
}

impl Default for PrometheusSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_prometheus_addr(),
        }
    }
}

fn default_prometheus_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or `EnvFilter` directive (e.g. "info,hyper=warn").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry section: service identity and where metrics and logs go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name, sent as the `service` tag.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Service version, sent as the `version` tag.
    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// Deployment environment, sent as the `env` tag.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Extra global tags in `key:value` form.
    #[serde(default)]
    pub tags: Vec<String>,

    /// DogStatsD agent.
    #[serde(default)]
    pub statsd: StatsdSection,

    /// Prometheus endpoint.
    #[serde(default)]
    pub prometheus: PrometheusSection,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            environment: default_environment(),
            tags: Vec::new(),
            statsd: StatsdSection::default(),
            prometheus: PrometheusSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "ecommerce-backend".to_string()
}

fn default_service_version() -> String {
    "1.0.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// Request metrics stage section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestMetricsSection {
    /// Emit per-request metrics.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Paths that never produce metrics. Compared without the query string.
    #[serde(default = "default_bypass_paths")]
    pub bypass_paths: Vec<String>,
}

impl Default for RequestMetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bypass_paths: default_bypass_paths(),
        }
    }
}

fn default_bypass_paths() -> Vec<String> {
    vec!["/health".to_string(), "/ready".to_string()]
}

fn default_true() -> bool {
    true
}
