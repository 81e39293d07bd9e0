//! Typed configuration for the Storefront backend.
//!
//! - TOML and JSON configuration files
//! - `STOREFRONT__SECTION__KEY` environment overrides
//! - Datadog agent variables (`DD_ENV`, `DD_SERVICE`, `DD_VERSION`,
//!   `DD_AGENT_HOST`, `DD_DOGSTATSD_PORT`)
//! - Strict validation (fails on unknown fields)
//!
//! # Example
//!
//! ```no_run
//! use storefront_config::ConfigLoader;
//!
//! # fn main() -> Result<(), storefront_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("storefront.toml")?
//!     .with_env_prefix("STOREFRONT")
//!     .with_datadog_env()
//!     .load()?;
//!
//! let telemetry = config.telemetry_config();
//! println!("metrics go to {}:{}", telemetry.statsd.host, telemetry.statsd.port);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//!
//! [telemetry]
//! service_name = "ecommerce-backend"
//! service_version = "1.0.0"
//! environment = "dev"
//! tags = ["team:checkout"]
//!
//! [telemetry.statsd]
//! host = "127.0.0.1"
//! port = 8125
//! prefix = "ecommerce."
//! sample_type = "histogram"
//!
//! [telemetry.prometheus]
//! enabled = false
//! addr = "0.0.0.0:9090"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [request_metrics]
//! enabled = true
//! bypass_paths = ["/health", "/ready"]
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StorefrontConfig::default();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.telemetry.service_name, "ecommerce-backend");
        assert_eq!(config.telemetry.statsd.prefix, "ecommerce.");
    }

    #[test]
    fn test_documented_file_format_parses() {
        let toml = r#"
            [telemetry.statsd]
            sample_type = "histogram"

            [request_metrics]
            bypass_paths = ["/health", "/ready"]
        "#;
        let config: StorefrontConfig = toml::from_str(toml).unwrap();
        assert_eq!(config, StorefrontConfig::default());
    }
}
