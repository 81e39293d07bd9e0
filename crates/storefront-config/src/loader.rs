//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, LogFormat, SampleKind, StorefrontConfig};

/// Default prefix for `PREFIX__SECTION__KEY` overrides.
pub const DEFAULT_ENV_PREFIX: &str = "STOREFRONT";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. `PREFIX__SECTION__KEY` environment variables
/// 4. Datadog agent variables (`DD_ENV`, `DD_SERVICE`, `DD_VERSION`,
///    `DD_AGENT_HOST`, `DD_DOGSTATSD_PORT`)
///
/// # Example
///
/// ```no_run
/// use storefront_config::ConfigLoader;
///
/// # fn main() -> Result<(), storefront_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("storefront.toml")?
///     .with_env_prefix("STOREFRONT")
///     .with_datadog_env()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: StorefrontConfig,
    env_prefix: Option<String>,
    datadog_env: bool,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StorefrontConfig::default(),
            env_prefix: None,
            datadog_env: false,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = StorefrontConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = StorefrontConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = StorefrontConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json), chosen by extension. The file
    /// replaces the current configuration; sections and fields it omits take
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        self.config = Self::parse_file(&content, path)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [telemetry.statsd]
    ///     host = "dd-agent"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.statsd.host, "dd-agent");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::UnknownFormat(format.to_string())),
        };
        Ok(self)
    }

    /// Set the prefix for `PREFIX__SECTION__KEY` overrides.
    ///
    /// With prefix "STOREFRONT":
    /// - `STOREFRONT__SERVER__HTTP_ADDR=0.0.0.0:9000`
    /// - `STOREFRONT__TELEMETRY__STATSD__PORT=8126`
    /// - `STOREFRONT__REQUEST_METRICS__BYPASS_PATHS=/health,/ready,/live`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply the Datadog agent variables after the prefixed overrides.
    #[must_use]
    pub const fn with_datadog_env(mut self) -> Self {
        self.datadog_env = true;
        self
    }

    /// Load a `.env` file into the process environment, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e)),
        }
    }

    /// Whether a configuration file was loaded.
    #[must_use]
    pub const fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment overrides, then validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Environment variable parsing fails
    /// - Configuration validation fails
    pub fn load(mut self) -> Result<StorefrontConfig, ConfigError> {
        self.apply_vars(env::vars())?;
        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without applying the environment or validating.
    #[must_use]
    pub fn load_unvalidated(self) -> StorefrontConfig {
        self.config
    }

    // Parse configuration file based on extension
    fn parse_file(content: &str, path: &Path) -> Result<StorefrontConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnknownFormat(path.display().to_string())),
        }
    }

    // Prefixed overrides first, Datadog variables last
    fn apply_vars<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        if let Some(prefix) = self.env_prefix.clone() {
            let marker = format!("{prefix}__");
            let mut overrides: Vec<&(String, String)> =
                vars.iter().filter(|(k, _)| k.starts_with(&marker)).collect();
            overrides.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in overrides {
                self.apply_env_var(key, value, &prefix)?;
            }
        }

        if self.datadog_env {
            for (key, value) in &vars {
                self.apply_datadog_var(key, value)?;
            }
        }

        Ok(())
    }

    fn apply_datadog_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Ok(());
        }
        let telemetry = &mut self.config.telemetry;
        match key {
            "DD_ENV" => telemetry.environment = value.to_string(),
            "DD_SERVICE" => telemetry.service_name = value.to_string(),
            "DD_VERSION" => telemetry.service_version = value.to_string(),
            "DD_AGENT_HOST" => telemetry.statsd.host = value.to_string(),
            "DD_DOGSTATSD_PORT" => {
                telemetry.statsd.port = value
                    .parse()
                    .map_err(|_| ConfigError::env(key, value, "a port number"))?;
            }
            _ => {}
        }
        Ok(())
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env(key, value, "a PREFIX__SECTION__KEY name"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Server section
            ["SERVER", "HTTP_ADDR"] => {
                config.server.http_addr = value.to_string();
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_CONNECTIONS"] => {
                config.server.max_connections = parse_number(key, value)?;
            }

            // Telemetry identity
            ["TELEMETRY", "SERVICE_NAME"] => {
                config.telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "SERVICE_VERSION"] => {
                config.telemetry.service_version = value.to_string();
            }
            ["TELEMETRY", "ENVIRONMENT"] => {
                config.telemetry.environment = value.to_string();
            }
            ["TELEMETRY", "TAGS"] => {
                config.telemetry.tags = parse_list(value);
            }

            // Telemetry StatsD
            ["TELEMETRY", "STATSD", "ENABLED"] => {
                config.telemetry.statsd.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "STATSD", "HOST"] => {
                config.telemetry.statsd.host = value.to_string();
            }
            ["TELEMETRY", "STATSD", "PORT"] => {
                config.telemetry.statsd.port = parse_number(key, value)?;
            }
            ["TELEMETRY", "STATSD", "PREFIX"] => {
                config.telemetry.statsd.prefix = value.to_string();
            }
            ["TELEMETRY", "STATSD", "SAMPLE_TYPE"] => {
                config.telemetry.statsd.sample_type = match value.to_lowercase().as_str() {
                    "histogram" | "h" => SampleKind::Histogram,
                    "distribution" | "d" => SampleKind::Distribution,
                    _ => {
                        return Err(ConfigError::env(key, value, "histogram or distribution"))
                    }
                };
            }
            ["TELEMETRY", "STATSD", "MAX_BUFFER_SIZE"] => {
                config.telemetry.statsd.max_buffer_size = parse_number(key, value)?;
            }
            ["TELEMETRY", "STATSD", "FLUSH_INTERVAL_MS"] => {
                config.telemetry.statsd.flush_interval_ms = parse_number(key, value)?;
            }

            // Telemetry Prometheus
            ["TELEMETRY", "PROMETHEUS", "ENABLED"] => {
                config.telemetry.prometheus.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "PROMETHEUS", "ADDR"] => {
                config.telemetry.prometheus.addr = value.to_string();
            }

            // Telemetry logging
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env(key, value, "json or pretty"))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                config.telemetry.logging.include_location = parse_flag(key, value)?;
            }

            // Request metrics
            ["REQUEST_METRICS", "ENABLED"] => {
                config.request_metrics.enabled = parse_flag(key, value)?;
            }
            ["REQUEST_METRICS", "BYPASS_PATHS"] => {
                config.request_metrics.bypass_paths = parse_list(value);
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env(key, value, "a boolean"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(key, value, "an integer"))
}

/// Comma-separated list; blank entries are dropped.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load_unvalidated();
        assert_eq!(config, StorefrontConfig::default());
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load_unvalidated();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load_unvalidated();
        assert_eq!(config.telemetry.environment, "production");
        assert!(config.telemetry.prometheus.enabled);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"request_metrics": {"bypass_paths": ["/live"]}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.request_metrics.bypass_paths, vec!["/live"]);
        assert!(config.request_metrics.enabled);
    }

    #[test]
    fn test_loader_with_string_unknown_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(matches!(result, Err(ConfigError::UnknownFormat(f)) if f == "yaml"));
    }

    #[test]
    fn test_loader_rejects_unknown_section() {
        let result = ConfigLoader::new().with_string("[database]\nurl = \"x\"", "toml");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/storefront.toml");
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/storefront.toml")
            .unwrap();
        assert!(!loader.file_loaded());
    }

    #[test]
    fn test_loader_with_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.toml");
        fs::write(
            &path,
            r#"
                [server]
                http_addr = "127.0.0.1:3001"

                [telemetry]
                service_name = "videogames-backend"

                [telemetry.statsd]
                port = 18125
            "#,
        )
        .unwrap();

        let loader = ConfigLoader::new().with_file(&path).unwrap();
        assert!(loader.file_loaded());
        let config = loader.load_unvalidated();

        assert_eq!(config.server.http_addr, "127.0.0.1:3001");
        assert_eq!(config.telemetry.service_name, "videogames-backend");
        assert_eq!(config.telemetry.statsd.port, 18125);
        assert_eq!(config.telemetry.statsd.host, "127.0.0.1");
    }

    #[test]
    fn test_loader_with_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storefront.ini");
        fs::write(&path, "x=1").unwrap();

        let result = ConfigLoader::new().with_file(&path);
        assert!(matches!(result, Err(ConfigError::UnknownFormat(f)) if f.ends_with("storefront.ini")));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("/health, /ready,,/live "), vec!["/health", "/ready", "/live"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_prefixed_overrides() {
        let mut loader = ConfigLoader::new().with_env_prefix("storefront");
        loader
            .apply_vars(vars(&[
                ("STOREFRONT__SERVER__HTTP_ADDR", "0.0.0.0:9000"),
                ("STOREFRONT__TELEMETRY__STATSD__SAMPLE_TYPE", "d"),
                ("STOREFRONT__TELEMETRY__TAGS", "team:checkout,region:eu"),
                ("STOREFRONT__REQUEST_METRICS__BYPASS_PATHS", "/health,/live"),
                ("OTHERAPP__SERVER__HTTP_ADDR", "0.0.0.0:1"),
            ]))
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.server.http_addr, "0.0.0.0:9000");
        assert_eq!(config.telemetry.statsd.sample_type, SampleKind::Distribution);
        assert_eq!(config.telemetry.tags, vec!["team:checkout", "region:eu"]);
        assert_eq!(config.request_metrics.bypass_paths, vec!["/health", "/live"]);
    }

    #[test]
    fn test_overrides_ignored_without_prefix() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_vars(vars(&[("STOREFRONT__SERVER__HTTP_ADDR", "0.0.0.0:9000")]))
            .unwrap();
        assert_eq!(loader.load_unvalidated().server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_integer_override() {
        let mut loader = ConfigLoader::new().with_env_prefix("STOREFRONT");
        let err = loader
            .apply_vars(vars(&[("STOREFRONT__TELEMETRY__STATSD__PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env { ref var, ref value, .. }
                if var == "STOREFRONT__TELEMETRY__STATSD__PORT" && value == "eighty"
        ));
    }

    #[test]
    fn test_invalid_boolean_override() {
        let mut loader = ConfigLoader::new().with_env_prefix("STOREFRONT");
        let result = loader.apply_vars(vars(&[("STOREFRONT__REQUEST_METRICS__ENABLED", "sure")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_datadog_variables() {
        let mut loader = ConfigLoader::new().with_datadog_env();
        loader
            .apply_vars(vars(&[
                ("DD_ENV", "prod"),
                ("DD_SERVICE", "videogames-ecommerce-backend"),
                ("DD_VERSION", "2.3.1"),
                ("DD_AGENT_HOST", "host.docker.internal"),
                ("DD_DOGSTATSD_PORT", "8135"),
                ("DD_APM_PORT", "8126"),
            ]))
            .unwrap();

        let telemetry = loader.load_unvalidated().telemetry;
        assert_eq!(telemetry.environment, "prod");
        assert_eq!(telemetry.service_name, "videogames-ecommerce-backend");
        assert_eq!(telemetry.service_version, "2.3.1");
        assert_eq!(telemetry.statsd.host, "host.docker.internal");
        assert_eq!(telemetry.statsd.port, 8135);
    }

    #[test]
    fn test_datadog_variables_win_over_prefixed() {
        let mut loader = ConfigLoader::new()
            .with_env_prefix("STOREFRONT")
            .with_datadog_env();
        loader
            .apply_vars(vars(&[
                ("DD_ENV", "staging"),
                ("STOREFRONT__TELEMETRY__ENVIRONMENT", "qa"),
            ]))
            .unwrap();
        assert_eq!(loader.load_unvalidated().telemetry.environment, "staging");
    }

    #[test]
    fn test_empty_datadog_variable_is_ignored() {
        let mut loader = ConfigLoader::new().with_datadog_env();
        loader.apply_vars(vars(&[("DD_ENV", "")])).unwrap();
        assert_eq!(loader.load_unvalidated().telemetry.environment, "dev");
    }

    #[test]
    fn test_invalid_dogstatsd_port() {
        let mut loader = ConfigLoader::new().with_datadog_env();
        let err = loader
            .apply_vars(vars(&[("DD_DOGSTATSD_PORT", "99999")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"DD_DOGSTATSD_PORT="99999": expected a port number"#
        );
    }

    #[test]
    fn test_complete_toml_config() {
        let toml = r#"
            [server]
            http_addr = "0.0.0.0:3001"
            shutdown_timeout_secs = 10
            request_timeout_ms = 5000

            [telemetry]
            service_name = "videogames-ecommerce-backend"
            service_version = "1.0.0"
            environment = "prod"
            tags = ["team:checkout"]

            [telemetry.statsd]
            host = "dd-agent"
            port = 8125
            prefix = "ecommerce."
            sample_type = "distribution"
            max_buffer_size = 1432
            flush_interval_ms = 500

            [telemetry.prometheus]
            enabled = true
            addr = "0.0.0.0:9464"

            [telemetry.logging]
            level = "info,hyper=warn"
            format = "json"

            [request_metrics]
            enabled = true
            bypass_paths = ["/health", "/ready", "/metrics"]
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load_unvalidated();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.shutdown_timeout_secs, 10);
        assert_eq!(config.telemetry.statsd.max_buffer_size, 1432);
        assert_eq!(config.telemetry.prometheus.addr, "0.0.0.0:9464");
        assert_eq!(config.request_metrics.bypass_paths.len(), 3);
    }
}
