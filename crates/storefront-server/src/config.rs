//! Listener and timeout settings.

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

/// What the accept loop and request handling read at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address, parsed when the server starts.
    pub http_addr: String,
    /// How long open connections may drain after shutdown is triggered.
    pub shutdown_timeout: Duration,
    /// Budget for reading the request body and, separately, for the handler.
    pub request_timeout: Duration,
    /// Cap on concurrently served connections; `None` accepts without limit.
    pub max_connections: Option<usize>,
}

impl ServerConfig {
    /// Settings for `http_addr` with default timeouts and no connection cap.
    pub fn new(http_addr: impl Into<String>) -> Self {
        Self {
            http_addr: http_addr.into(),
            ..Self::default()
        }
    }

    /// Parses [`http_addr`](Self::http_addr).
    ///
    /// # Errors
    ///
    /// Returns the parse error for anything that is not `ip:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.http_addr.parse()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_connections: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_default_timeouts() {
        let config = ServerConfig::new("127.0.0.1:3001");
        assert_eq!(config.socket_addr().unwrap().port(), 3001);
        assert_eq!(config.shutdown_timeout, ServerConfig::default().shutdown_timeout);
        assert!(config.max_connections.is_none());
    }

    #[test]
    fn test_hostname_is_not_a_socket_addr() {
        assert!(ServerConfig::new("localhost:8080").socket_addr().is_err());
    }
}
