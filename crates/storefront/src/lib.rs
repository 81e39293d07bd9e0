//! # Storefront
//!
//! Request metrics for the storefront backend: every HTTP exchange is timed
//! on a monotonic clock, labeled with a low-cardinality route and reported to
//! a DogStatsD agent once the response has been fully sent.
//!
//! ```text
//! Request → RequestId → RequestMetrics → Handler
//!                                          ↓
//! Response ← RequestId ← RequestMetrics ←──┘
//!                │
//!                └─ on body completion → MetricsSink (StatsD / metrics facade)
//! ```
//!
//! This crate re-exports the workspace crates and wires them together in
//! [`app`]; the `storefront` binary is a thin shell around it.

pub mod app;

pub use storefront_config as config;
pub use storefront_middleware as middleware;
pub use storefront_server as server;
pub use storefront_telemetry as telemetry;

/// Common imports.
pub mod prelude {
    pub use storefront_config::{ConfigLoader, StorefrontConfig};
    pub use storefront_middleware::{
        MetricEvent, MiddlewareContext, Pipeline, RequestId, RequestIdMiddleware,
        RequestMetricsMiddleware,
    };
    pub use storefront_server::{
        HandlerContext, HandlerError, HandlerRegistry, Router, Server, ShutdownSignal,
    };
    pub use storefront_telemetry::{names, MetricsSink, SharedSink, Tag, TelemetryGuard};

    pub use crate::app::{build_pipeline, build_server};
}
