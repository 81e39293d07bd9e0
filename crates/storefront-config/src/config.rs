//! Main configuration types.
//!
//! This module provides the top-level [`StorefrontConfig`] struct and its builder.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storefront_telemetry::{
    LogConfig, PrometheusConfig, SampleType, StatsdConfig, Tag, TelemetryConfig,
};

use crate::{
    ConfigError, LogFormat, RequestMetricsSection, SampleKind, ServerConfig, TelemetrySection,
};

/// Complete Storefront backend configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use storefront_config::StorefrontConfig;
///
/// let config = StorefrontConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.telemetry.statsd.port, 8125);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct StorefrontConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Telemetry configuration (StatsD, Prometheus, logging).
    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Request metrics stage configuration.
    #[serde(default)]
    pub request_metrics: RequestMetricsSection,
}

impl StorefrontConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_config::{ServerConfig, StorefrontConfig};
    ///
    /// let config = StorefrontConfig::builder()
    ///     .server(ServerConfig {
    ///         http_addr: "127.0.0.1:3000".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    #[must_use]
    pub fn builder() -> StorefrontConfigBuilder {
        StorefrontConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - the server or Prometheus address is not a socket address
    /// - the StatsD host is empty or its port is 0 while StatsD is enabled
    /// - a global tag is not in `key:value` form
    /// - a bypass path does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "server.shutdown_timeout_secs",
                "must be greater than 0",
            ));
        }

        let statsd = &self.telemetry.statsd;
        if statsd.enabled {
            if statsd.host.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "telemetry.statsd.host",
                    "must not be empty",
                ));
            }
            if statsd.port == 0 {
                return Err(ConfigError::invalid(
                    "telemetry.statsd.port",
                    "must be between 1 and 65535",
                ));
            }
        }

        let prometheus = &self.telemetry.prometheus;
        if prometheus.enabled && prometheus.addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "telemetry.prometheus.addr",
                format!("invalid socket address: {}", prometheus.addr),
            ));
        }

        if let Some(bad) = self
            .telemetry
            .tags
            .iter()
            .find(|raw| Tag::parse(raw).is_none())
        {
            return Err(ConfigError::invalid(
                "telemetry.tags",
                format!("expected key:value, got {bad:?}"),
            ));
        }

        if let Some(bad) = self
            .request_metrics
            .bypass_paths
            .iter()
            .find(|path| !path.starts_with('/'))
        {
            return Err(ConfigError::invalid(
                "request_metrics.bypass_paths",
                format!("path must start with '/': {bad:?}"),
            ));
        }

        Ok(())
    }

    /// Builds the telemetry configuration for
    /// [`init_telemetry`](storefront_telemetry::init_telemetry).
    ///
    /// Tags that are not in `key:value` form are skipped; [`validate`](Self::validate)
    /// rejects them beforehand.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let section = &self.telemetry;

        let statsd = StatsdConfig {
            enabled: section.statsd.enabled,
            host: section.statsd.host.clone(),
            port: section.statsd.port,
            prefix: section.statsd.prefix.clone(),
            sample_type: match section.statsd.sample_type {
                SampleKind::Histogram => SampleType::Histogram,
                SampleKind::Distribution => SampleType::Distribution,
            },
            max_buffer_size: section.statsd.max_buffer_size,
            flush_interval: Duration::from_millis(section.statsd.flush_interval_ms),
        };

        let logging = LogConfig {
            enabled: section.logging.enabled,
            level: section.logging.level.clone(),
            json_format: section.logging.format == LogFormat::Json,
            file_line_info: section.logging.include_location,
            include_target: true,
            service_name: section.service_name.clone(),
        };

        TelemetryConfig {
            service_name: section.service_name.clone(),
            service_version: section.service_version.clone(),
            environment: section.environment.clone(),
            extra_tags: section.tags.iter().filter_map(|raw| Tag::parse(raw)).collect(),
            statsd,
            prometheus: PrometheusConfig {
                enabled: section.prometheus.enabled,
                addr: section.prometheus.addr.clone(),
            },
            logging,
        }
    }

    /// Shutdown timeout as a [`Duration`].
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty logs at debug level with source locations
    /// - StatsD against a local agent
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_config::StorefrontConfig;
    ///
    /// let config = StorefrontConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.telemetry.environment = "dev".to_string();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;

        config
    }

    /// Create a production configuration preset.
    ///
    /// - JSON logs at info level
    /// - Buffered StatsD datagrams
    /// - Prometheus scrape endpoint enabled
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_config::{LogFormat, StorefrontConfig};
    ///
    /// let config = StorefrontConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.environment = "production".to_string();
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.statsd.max_buffer_size = 1432;
        config.telemetry.prometheus.enabled = true;

        config
    }
}

/// Builder for [`StorefrontConfig`].
#[derive(Debug, Default)]
pub struct StorefrontConfigBuilder {
    server: Option<ServerConfig>,
    telemetry: Option<TelemetrySection>,
    request_metrics: Option<RequestMetricsSection>,
}

impl StorefrontConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the request metrics configuration.
    #[must_use]
    pub fn request_metrics(mut self, request_metrics: RequestMetricsSection) -> Self {
        self.request_metrics = Some(request_metrics);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> StorefrontConfig {
        StorefrontConfig {
            server: self.server.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            request_metrics: self.request_metrics.unwrap_or_default(),
        }
    }
}
