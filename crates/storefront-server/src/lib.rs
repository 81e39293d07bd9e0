//! # Storefront Server
//!
//! HTTP/1.1 server for the storefront backend, built on Hyper and Tokio.
//!
//! - Method + path routing with `:name` / `{name}` parameters and nesting
//! - Handler registry keyed by operation ID (JSON, no-body and raw handlers)
//! - Every request runs through a [`Pipeline`](storefront_middleware::Pipeline)
//! - `/health` and `/ready` probes
//! - Graceful shutdown on SIGTERM / SIGINT with connection draining
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_middleware::{Pipeline, RequestIdMiddleware, RequestMetricsMiddleware};
//! use storefront_server::{HandlerError, HandlerRegistry, Router, Server};
//! use storefront_telemetry::NoopSink;
//! use http::Method;
//!
//! # async fn run() -> Result<(), storefront_server::ServerError> {
//! let pipeline = Pipeline::builder()
//!     .stage(RequestIdMiddleware::new())
//!     .stage(RequestMetricsMiddleware::new(Arc::new(NoopSink)))
//!     .build();
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_no_body("getCart", |ctx| async move {
//!     Ok::<_, HandlerError>(serde_json::json!({ "cart": ctx.param("id") }))
//! });
//!
//! Server::builder()
//!     .router(Router::new().route(Method::GET, "/carts/:id", "getCart"))
//!     .handlers(handlers)
//!     .pipeline(pipeline)
//!     .build()
//!     .run()
//!     .await
//! # }
//! ```

pub mod config;
pub mod handler;
pub mod health;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use handler::{
    BoxedHandlerResult, ErasedHandler, HandlerContext, HandlerError, HandlerRegistry, InvokeError,
};
pub use health::{HealthCheck, HealthStatus, ReadinessCheck, ReadinessStatus};
pub use router::{RouteLookup, RouteMatch, Router};
pub use server::{Server, ServerBuilder, ServerError, HEALTH_PATH, READY_PATH};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReceiver, ShutdownSignal};
