//! Liveness and readiness probes.
//!
//! - `GET /health` reports service, version and uptime; always 200 while
//!   the process serves requests.
//! - `GET /ready` is 200 while every registered check passes and the server
//!   is not draining, 503 otherwise.
//!
//! Both paths are in the default metrics bypass set.
//!
//! ```rust
//! use storefront_server::{HealthCheck, ReadinessCheck};
//!
//! let health = HealthCheck::new("ecommerce-backend", "1.0.0");
//! assert_eq!(health.status().service(), "ecommerce-backend");
//!
//! let readiness = ReadinessCheck::new().add_check("catalog_loaded", || true);
//! assert!(readiness.is_ready());
//! readiness.set_ready(false);
//! assert!(!readiness.is_ready());
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    status: String,
    service: String,
    version: String,
    uptime_seconds: u64,
}

impl HealthStatus {
    /// Creates a healthy status.
    #[must_use]
    pub fn healthy(service: impl Into<String>, version: impl Into<String>, uptime: Duration) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.into(),
            version: version.into(),
            uptime_seconds: uptime.as_secs(),
        }
    }

    /// Returns the status string.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the uptime in seconds.
    #[must_use]
    pub const fn uptime_seconds(&self) -> u64 {
        self.uptime_seconds
    }

    /// Returns whether the status is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Liveness probe.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    start_time: Instant,
}

impl HealthCheck {
    /// Creates a health check; uptime counts from now.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            start_time: Instant::now(),
        }
    }

    /// Returns the current health status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus::healthy(&self.service, &self.version, self.uptime())
    }

    /// Returns the server uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Body of the `/ready` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadinessStatus {
    ready: bool,
    checks: BTreeMap<String, bool>,
}

impl ReadinessStatus {
    /// Returns whether the service is ready.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the result of a specific check.
    #[must_use]
    pub fn check(&self, name: &str) -> Option<bool> {
        self.checks.get(name).copied()
    }
}

type ReadinessCheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Readiness probe: ready when not draining and all checks pass.
#[derive(Clone)]
pub struct ReadinessCheck {
    checks: Vec<(String, ReadinessCheckFn)>,
    accepting: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadinessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessCheck")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("accepting", &self.accepting.load(Ordering::SeqCst))
            .finish()
    }
}

impl ReadinessCheck {
    /// Creates a readiness check with no checks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Adds a named check.
    #[must_use]
    pub fn add_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Returns whether the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.accepting.load(Ordering::SeqCst) && self.checks.iter().all(|(_, check)| check())
    }

    /// Runs every check and reports each result.
    #[must_use]
    pub fn status(&self) -> ReadinessStatus {
        let checks: BTreeMap<String, bool> = self
            .checks
            .iter()
            .map(|(name, check)| (name.clone(), check()))
            .collect();

        let ready = self.accepting.load(Ordering::SeqCst) && checks.values().all(|&v| v);

        ReadinessStatus { ready, checks }
    }

    /// Marks the server as accepting traffic or draining. Shared by clones.
    pub fn set_ready(&self, ready: bool) {
        self.accepting.store(ready, Ordering::SeqCst);
    }

    /// Returns the number of registered checks.
    #[must_use]
    pub fn check_count(&self) -> usize {
        self.checks.len()
    }
}

impl Default for ReadinessCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serializes() {
        let status = HealthStatus::healthy("ecommerce-backend", "1.0.0", Duration::from_secs(42));
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "ecommerce-backend");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["uptime_seconds"], 42);
    }

    #[test]
    fn test_health_check_reports_identity() {
        let health = HealthCheck::new("shop", "2.0.0");
        let status = health.status();
        assert!(status.is_healthy());
        assert_eq!(status.version(), "2.0.0");
        assert!(status.uptime_seconds() < 5);
    }

    #[test]
    fn test_readiness_without_checks() {
        let readiness = ReadinessCheck::default();
        assert!(readiness.is_ready());
        assert_eq!(readiness.check_count(), 0);
    }

    #[test]
    fn test_failing_check_reported() {
        let readiness = ReadinessCheck::new()
            .add_check("statsd", || true)
            .add_check("inventory", || false);

        let status = readiness.status();
        assert!(!status.is_ready());
        assert_eq!(status.check("statsd"), Some(true));
        assert_eq!(status.check("inventory"), Some(false));
        assert_eq!(status.check("missing"), None);
    }

    #[test]
    fn test_draining_is_shared_between_clones() {
        let readiness = ReadinessCheck::new();
        let clone = readiness.clone();

        readiness.set_ready(false);
        assert!(!clone.is_ready());
        assert!(!clone.status().is_ready());
    }
}
