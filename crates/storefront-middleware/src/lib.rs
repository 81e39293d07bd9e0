//! # Storefront Middleware
//!
//! Middleware pipeline and the request metrics stage for the Storefront
//! backend.
//!
//! ## Pipeline
//!
//! ```text
//! Request → RequestId → RequestMetrics → Handler
//!                                           ↓
//! Response ← RequestId ← RequestMetrics ←───┘
//!                             │
//!                             └── on body completion ──► MetricsSink
//! ```
//!
//! | Stage | Middleware | Purpose |
//! |-------|------------|---------|
//! | 1 | Request ID | Generate/propagate request ID (UUID v7) |
//! | 2 | Request Metrics | Latency, route, status metrics to the sink |
//!
//! ## Route labels
//!
//! ```
//! use storefront_middleware::route::normalize_route;
//!
//! assert_eq!(normalize_route("/orders/123/items/456"), "/orders/:id/items/:id");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
pub mod clock;
pub mod context;
pub mod event;
pub mod middleware;
pub mod pipeline;
pub mod route;
pub mod stages;
pub mod types;

pub use body::{is_bodiless, BodyCompletion, CompletionBody};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use context::{MiddlewareContext, RequestId};
pub use event::{status_family, MetricEvent};
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use route::{normalize_route, resolve_route};
pub use stages::{RequestIdMiddleware, RequestMetricsMiddleware};
pub use types::{BoxBody, Request, Response, ResponseExt};
