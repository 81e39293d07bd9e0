//! Telemetry configuration.

use std::time::Duration;

use crate::logging::LogConfig;
use crate::sink::Tag;

/// Default DogStatsD agent port.
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Default metric name prefix.
pub const DEFAULT_METRIC_PREFIX: &str = "ecommerce.";

/// How distribution samples are typed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    /// `|h` samples, understood by every StatsD server.
    #[default]
    Histogram,
    /// `|d` samples, aggregated globally by the Datadog backend.
    Distribution,
}

impl SampleType {
    /// Returns the DogStatsD type suffix.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Histogram => "h",
            Self::Distribution => "d",
        }
    }
}

/// DogStatsD sink configuration.
#[derive(Debug, Clone)]
pub struct StatsdConfig {
    /// Whether the StatsD sink is enabled.
    pub enabled: bool,

    /// Agent host name or IP.
    pub host: String,

    /// Agent UDP port.
    pub port: u16,

    /// Prefix prepended to every metric name (e.g. `ecommerce.`).
    pub prefix: String,

    /// Wire type for distribution samples.
    pub sample_type: SampleType,

    /// Maximum datagram payload when buffering; `0` sends one datagram per metric.
    pub max_buffer_size: usize,

    /// How often buffered lines are flushed when buffering is on.
    pub flush_interval: Duration,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_STATSD_PORT,
            prefix: DEFAULT_METRIC_PREFIX.to_string(),
            sample_type: SampleType::default(),
            max_buffer_size: 0,
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// Prometheus exporter configuration, backed by the `metrics` facade.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Whether the exporter is installed.
    pub enabled: bool,

    /// Address the scrape endpoint listens on.
    pub addr: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name (global `service` tag).
    pub service_name: String,

    /// Service version (global `version` tag).
    pub service_version: String,

    /// Deployment environment (global `env` tag).
    pub environment: String,

    /// Additional process-wide tags.
    pub extra_tags: Vec<Tag>,

    /// StatsD sink configuration.
    pub statsd: StatsdConfig,

    /// Prometheus exporter configuration.
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }

    /// Returns the process-wide tags applied by every sink: `env`,
    /// `service`, `version`, then any extra tags.
    pub fn global_tags(&self) -> Vec<Tag> {
        let mut tags = vec![
            Tag::new("env", &self.environment),
            Tag::new("service", &self.service_name),
            Tag::new("version", &self.service_version),
        ];
        tags.extend(self.extra_tags.iter().cloned());
        tags
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ecommerce-backend".to_string(),
            service_version: "1.0.0".to_string(),
            environment: "dev".to_string(),
            extra_tags: Vec::new(),
            statsd: StatsdConfig::default(),
            prometheus: PrometheusConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    environment: Option<String>,
    extra_tags: Vec<Tag>,
    statsd: Option<StatsdConfig>,
    prometheus: Option<PrometheusConfig>,
    logging: Option<LogConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn service_version(mut self, version: &str) -> Self {
        self.service_version = Some(version.to_string());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.environment = Some(env.to_string());
        self
    }

    /// Adds a process-wide tag.
    #[must_use]
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.extra_tags.push(Tag::new(key, value));
        self
    }

    /// Sets the StatsD configuration.
    #[must_use]
    pub fn statsd(mut self, config: StatsdConfig) -> Self {
        self.statsd = Some(config);
        self
    }

    /// Points the StatsD sink at an agent.
    #[must_use]
    pub fn statsd_agent(mut self, host: &str, port: u16) -> Self {
        let config = self.statsd.take().unwrap_or_default();
        self.statsd = Some(StatsdConfig {
            enabled: true,
            host: host.to_string(),
            port,
            ..config
        });
        self
    }

    /// Sets the Prometheus configuration.
    #[must_use]
    pub fn prometheus(mut self, config: PrometheusConfig) -> Self {
        self.prometheus = Some(config);
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        let service_name = self.service_name.unwrap_or(defaults.service_name);
        let mut logging = self.logging.unwrap_or(defaults.logging);
        logging.service_name = service_name.clone();

        TelemetryConfig {
            service_name,
            service_version: self.service_version.unwrap_or(defaults.service_version),
            environment: self.environment.unwrap_or(defaults.environment),
            extra_tags: self.extra_tags,
            statsd: self.statsd.unwrap_or(defaults.statsd),
            prometheus: self.prometheus.unwrap_or(defaults.prometheus),
            logging,
        }
    }
}
