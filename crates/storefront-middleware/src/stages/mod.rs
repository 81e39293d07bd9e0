//! Built-in middleware stages.
//!
//! - [`request_id`]: generate or propagate the request ID
//! - [`request_metrics`]: per-request counters and latency for the metrics sink

pub mod request_id;
pub mod request_metrics;

pub use request_id::RequestIdMiddleware;
pub use request_metrics::RequestMetricsMiddleware;
