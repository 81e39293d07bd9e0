//! Errors reported while assembling a [`StorefrontConfig`](crate::StorefrontConfig).

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file {} does not exist", path.display())]
    Missing {
        /// Requested path.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read configuration file {}", path.display())]
    Unreadable {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The format could not be told from the file extension or format name.
    #[error("cannot tell configuration format of {0:?}; use toml or json")]
    UnknownFormat(String),

    /// TOML input did not match the configuration schema.
    #[error("malformed TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON input did not match the configuration schema.
    #[error("malformed JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A `.env` file exists but could not be parsed.
    #[error("cannot load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// An environment variable holds a value of the wrong shape.
    #[error("{var}={value:?}: expected {expected}")]
    Env {
        /// Variable name, e.g. `DD_DOGSTATSD_PORT`.
        var: String,
        /// Raw value.
        value: String,
        /// What the variable accepts.
        expected: &'static str,
    },

    /// A loaded value failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted path of the field, e.g. `telemetry.statsd.port`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn env(var: &str, value: &str, expected: &'static str) -> Self {
        Self::Env {
            var: var.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
