//! Wiring from loaded configuration to a runnable server.

use std::time::Duration;

use storefront_config::{RequestMetricsSection, StorefrontConfig};
use storefront_middleware::{Pipeline, RequestIdMiddleware, RequestMetricsMiddleware};
use storefront_server::{HandlerRegistry, Router, Server, ServerConfig};
use storefront_telemetry::SharedSink;

/// Builds the production pipeline: request ID first, then request metrics.
///
/// Any stage that can rewrite the status must be appended after these so
/// the metrics stage observes the final response.
#[must_use]
pub fn build_pipeline(section: &RequestMetricsSection, sink: SharedSink) -> Pipeline {
    let metrics = RequestMetricsMiddleware::new(sink)
        .bypass_paths(section.bypass_paths.iter().cloned())
        .enabled(section.enabled);

    Pipeline::builder()
        .stage(RequestIdMiddleware::new())
        .stage(metrics)
        .build()
}

/// Converts the `server` config section into the server's own settings.
///
/// `max_connections = 0` means unlimited.
#[must_use]
pub fn server_config(section: &storefront_config::ServerConfig) -> ServerConfig {
    let max_connections = match section.max_connections {
        0 => None,
        n => usize::try_from(n).ok(),
    };

    ServerConfig {
        http_addr: section.http_addr.clone(),
        shutdown_timeout: Duration::from_secs(section.shutdown_timeout_secs),
        request_timeout: Duration::from_millis(section.request_timeout_ms),
        max_connections,
    }
}

/// Builds the server for `config`, reporting to `sink`.
#[must_use]
pub fn build_server(
    config: &StorefrontConfig,
    sink: SharedSink,
    router: Router,
    handlers: HandlerRegistry,
) -> Server {
    Server::builder()
        .config(server_config(&config.server))
        .service(
            config.telemetry.service_name.clone(),
            config.telemetry.service_version.clone(),
        )
        .router(router)
        .handlers(handlers)
        .pipeline(build_pipeline(&config.request_metrics, sink))
        .build()
}
