//! HTTP server.
//!
//! Every request, including probes, 404s and malformed bodies, flows
//! through the middleware [`Pipeline`] so the request metrics stage sees the
//! final status. Routing happens before the pipeline runs so the matched
//! template and mount path are on the context when metrics are labeled.
//!
//! ```text
//! accept → hyper http1 → collect body → route → Pipeline → dispatch
//!                                                            ├─ /health, /ready
//!                                                            ├─ handler (timeout → 504)
//!                                                            ├─ 405 with Allow
//!                                                            └─ 404
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use storefront_server::{HandlerRegistry, Router, Server, ServerConfig};
//! use http::Method;
//!
//! # async fn run() -> Result<(), storefront_server::ServerError> {
//! let router = Router::new().route(Method::GET, "/products", "listProducts");
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_no_body("listProducts", |_ctx| async {
//!     Ok::<_, storefront_server::HandlerError>(vec!["keyboard", "mouse"])
//! });
//!
//! Server::builder()
//!     .config(ServerConfig::new("127.0.0.1:8080"))
//!     .router(router)
//!     .handlers(handlers)
//!     .build()
//!     .run()
//!     .await
//! # }
//! ```

use std::convert::Infallible;
use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use storefront_middleware::stages::RequestIdMiddleware;
use storefront_middleware::{
    MiddlewareContext, Pipeline, Request, RequestId, Response, ResponseExt,
};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::handler::{json_response, HandlerContext, HandlerRegistry, InvokeError};
use crate::health::{HealthCheck, ReadinessCheck};
use crate::router::{RouteLookup, RouteMatch, Router};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Liveness probe path.
pub const HEALTH_PATH: &str = "/health";

/// Readiness probe path.
pub const READY_PATH: &str = "/ready";

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address is not a socket address.
    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        /// The address as configured.
        addr: String,
        /// Parse failure.
        #[source]
        source: AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was tried.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What the terminal handler should do with a request.
enum Target {
    Health,
    Ready,
    Route(RouteLookup),
}

/// A request that could not be read and is answered without dispatching.
#[derive(Clone, Copy)]
struct Rejection {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
}

/// The storefront HTTP server.
pub struct Server {
    config: ServerConfig,
    router: Router,
    handlers: HandlerRegistry,
    pipeline: Pipeline,
    health: HealthCheck,
    readiness: ReadinessCheck,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.router.route_count())
            .field("handlers", &self.handlers)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the handler registry.
    #[must_use]
    pub const fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Returns the middleware pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns a handle to the readiness probe; clones share the ready flag.
    #[must_use]
    pub fn readiness(&self) -> ReadinessCheck {
        self.readiness.clone()
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|source| ServerError::InvalidAddress {
                addr: self.config.http_addr.clone(),
                source,
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers, then drains open connections for up to the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            routes = self.router.route_count(),
            handlers = self.handlers.len(),
            stages = ?self.pipeline.stage_names(),
            "server listening"
        );

        let limiter = self.config.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            let permit = match &limiter {
                Some(semaphore) => tokio::select! {
                    permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
                    () = shutdown.recv() => break,
                },
                None => None,
            };

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            server.serve_connection(stream, remote_addr, shutdown, permit).await;
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => break,
            }
        }

        server.readiness.set_ready(false);

        let shutdown_timeout = server.config.shutdown_timeout;
        tracing::info!(
            timeout = ?shutdown_timeout,
            active = tracker.active_connections(),
            "shutdown requested, draining connections"
        );

        if tokio::time::timeout(shutdown_timeout, tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
        _permit: Option<OwnedSemaphorePermit>,
    ) {
        let server = Arc::clone(&self);
        let service = service_fn(move |request: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(request).await) }
        });

        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let mut draining = false;
        let result = loop {
            tokio::select! {
                result = conn.as_mut() => break result,
                () = shutdown.recv(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        };

        if let Err(e) = result {
            tracing::debug!(remote = %remote_addr, error = %e, "connection closed with error");
        }
    }

    async fn handle_request(self: Arc<Self>, request: http::Request<Incoming>) -> Response {
        let (parts, body) = request.into_parts();

        let (body, rejection) =
            match tokio::time::timeout(self.config.request_timeout, body.collect()).await {
                Ok(Ok(collected)) => (collected.to_bytes(), None),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "failed to read request body");
                    let rejection = Rejection {
                        status: StatusCode::BAD_REQUEST,
                        code: "BODY_READ_ERROR",
                        message: "failed to read request body",
                    };
                    (Bytes::new(), Some(rejection))
                }
                Err(_) => {
                    tracing::warn!("request body not received in time");
                    let rejection = Rejection {
                        status: StatusCode::REQUEST_TIMEOUT,
                        code: "REQUEST_TIMEOUT",
                        message: "request body not received in time",
                    };
                    (Bytes::new(), Some(rejection))
                }
            };

        let mut request: Request = http::Request::from_parts(parts, Full::new(body));
        let mut ctx = MiddlewareContext::new();

        let target = match (request.method(), request.uri().path()) {
            (&Method::GET, HEALTH_PATH) => Target::Health,
            (&Method::GET, READY_PATH) => Target::Ready,
            (method, path) => Target::Route(self.router.lookup(method, path)),
        };

        if let Target::Route(RouteLookup::Matched(route)) = &target {
            ctx.set_matched_route(route.template());
            if let Some(mount_path) = route.mount_path() {
                ctx.set_mount_path(mount_path);
            }
            request.extensions_mut().insert(route.clone());
        }

        let server = Arc::clone(&self);
        self.pipeline
            .process(ctx, request, move |ctx, request| {
                let request_id = ctx.request_id();
                Box::pin(async move {
                    match rejection {
                        Some(r) => Response::json_error(r.status, r.code, r.message),
                        None => server.dispatch(request_id, target, request).await,
                    }
                })
            })
            .await
    }

    async fn dispatch(&self, request_id: RequestId, target: Target, request: Request) -> Response {
        match target {
            Target::Health => self.health_response(),
            Target::Ready => self.ready_response(),
            Target::Route(RouteLookup::Matched(route)) => {
                self.invoke(request_id, route, request).await
            }
            Target::Route(RouteLookup::MethodNotAllowed(allowed)) => {
                method_not_allowed(request.method(), &allowed)
            }
            Target::Route(RouteLookup::NotFound) => Response::json_error(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("no route for {} {}", request.method(), request.uri().path()),
            ),
        }
    }

    async fn invoke(&self, request_id: RequestId, route: RouteMatch, request: Request) -> Response {
        let operation_id = route.operation_id().to_string();
        let ctx = HandlerContext::new(request_id, Some(route));

        let outcome = tokio::time::timeout(
            self.config.request_timeout,
            self.handlers.invoke(&operation_id, ctx, request),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(InvokeError::HandlerNotFound(_))) => {
                tracing::warn!(operation_id = %operation_id, "route has no registered handler");
                Response::json_error(
                    StatusCode::NOT_IMPLEMENTED,
                    "NOT_IMPLEMENTED",
                    &format!("operation '{operation_id}' is not implemented"),
                )
            }
            Ok(Err(InvokeError::Handler(err))) => {
                if err.status_code().is_server_error() {
                    tracing::error!(
                        operation_id = %operation_id,
                        request_id = %request_id,
                        error = %err,
                        "handler failed"
                    );
                }
                err.into_response(&operation_id)
            }
            Err(_) => {
                tracing::warn!(operation_id = %operation_id, request_id = %request_id, "handler timed out");
                Response::json_error(
                    StatusCode::GATEWAY_TIMEOUT,
                    "HANDLER_TIMEOUT",
                    "handler execution timed out",
                )
            }
        }
    }

    fn health_response(&self) -> Response {
        match serde_json::to_vec(&self.health.status()) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize health status");
                Response::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "failed to serialize health status",
                )
            }
        }
    }

    fn ready_response(&self) -> Response {
        let status = self.readiness.status();
        let code = if status.is_ready() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        match serde_json::to_vec(&status) {
            Ok(body) => json_response(code, body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize readiness status");
                Response::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "failed to serialize readiness status",
                )
            }
        }
    }
}

fn method_not_allowed(method: &Method, allowed: &[Method]) -> Response {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut response = Response::json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        &format!("method {method} not allowed"),
    );
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
    handlers: HandlerRegistry,
    pipeline: Option<Pipeline>,
    readiness: ReadinessCheck,
    service_name: String,
    service_version: String,
}

impl ServerBuilder {
    /// Creates a builder with default configuration and no routes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            router: Router::new(),
            handlers: HandlerRegistry::new(),
            pipeline: None,
            readiness: ReadinessCheck::new(),
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets the server configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the router.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Sets the handler registry.
    #[must_use]
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Sets the middleware pipeline.
    ///
    /// Without one, only request IDs are assigned.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the readiness probe.
    #[must_use]
    pub fn readiness(mut self, readiness: ReadinessCheck) -> Self {
        self.readiness = readiness;
        self
    }

    /// Sets the service identity reported by `/health`.
    #[must_use]
    pub fn service(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.service_name = name.into();
        self.service_version = version.into();
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        let pipeline = self
            .pipeline
            .unwrap_or_else(|| Pipeline::builder().stage(RequestIdMiddleware::new()).build());

        Server {
            config: self.config,
            router: self.router,
            handlers: self.handlers,
            pipeline,
            health: HealthCheck::new(self.service_name, self.service_version),
            readiness: self.readiness,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use std::time::Duration;

    fn request(method: &str, path: &str, body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn call(server: &Arc<Server>, method: &str, path: &str, body: &'static str) -> (StatusCode, Response) {
        let request = request(method, path, body);
        let mut ctx = MiddlewareContext::new();
        let target = match (request.method(), request.uri().path()) {
            (&Method::GET, HEALTH_PATH) => Target::Health,
            (&Method::GET, READY_PATH) => Target::Ready,
            (m, p) => Target::Route(server.router.lookup(m, p)),
        };
        if let Target::Route(RouteLookup::Matched(route)) = &target {
            ctx.set_matched_route(route.template());
        }
        let response = server.dispatch(ctx.request_id(), target, request).await;
        (response.status(), response)
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn test_server() -> Arc<Server> {
        let router = Router::new()
            .route(Method::GET, "/products/:id", "getProduct")
            .route(Method::POST, "/products", "createProduct")
            .route(Method::GET, "/slow", "slow")
            .route(Method::GET, "/unwired", "unwired");

        let mut handlers = HandlerRegistry::new();
        handlers.register_no_body("getProduct", |ctx: HandlerContext| async move {
            Ok::<_, HandlerError>(serde_json::json!({ "id": ctx.param("id") }))
        });
        handlers.register_no_body("slow", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, HandlerError>("late")
        });

        Arc::new(
            Server::builder()
                .config(ServerConfig {
                    request_timeout: Duration::from_millis(50),
                    ..ServerConfig::default()
                })
                .router(router)
                .handlers(handlers)
                .service("ecommerce-backend", "1.2.3")
                .build(),
        )
    }

    #[test]
    fn test_builder_defaults() {
        let server = Server::builder().build();
        assert_eq!(server.config().http_addr, "0.0.0.0:8080");
        assert_eq!(server.pipeline().stage_names(), vec!["request_id"]);
        assert!(server.handlers().is_empty());
        assert_eq!(server.router().route_count(), 0);
    }

    #[tokio::test]
    async fn test_matched_route_invokes_handler() {
        let server = test_server();
        let (status, response) = call(&server, "GET", "/products/42", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(response).await["id"], "42");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let server = test_server();
        let (status, response) = call(&server, "GET", "/nowhere", "").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405_with_allow() {
        let server = test_server();
        let (status, response) = call(&server, "DELETE", "/products", "").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");
    }

    #[tokio::test]
    async fn test_missing_handler_is_501() {
        let server = test_server();
        let (status, _) = call(&server, "GET", "/unwired", "").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        let server = test_server();
        let (status, response) = call(&server, "GET", "/slow", "").await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json(response).await["error"]["code"], "HANDLER_TIMEOUT");
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let server = test_server();

        let (status, response) = call(&server, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["service"], "ecommerce-backend");
        assert_eq!(body["version"], "1.2.3");

        let (status, _) = call(&server, "GET", "/ready", "").await;
        assert_eq!(status, StatusCode::OK);

        server.readiness().set_ready(false);
        let (status, response) = call(&server, "GET", "/ready", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["ready"], false);
    }

    #[tokio::test]
    async fn test_invalid_address_is_reported() {
        let server = Server::builder()
            .config(ServerConfig::new("not-an-address"))
            .build();

        let err = server
            .run_with_shutdown(ShutdownSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress { .. }));
        assert!(err.to_string().contains("not-an-address"));
    }
}
