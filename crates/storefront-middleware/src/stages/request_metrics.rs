//! Request metrics middleware.
//!
//! Observes every request/response pair exactly once and reports it to a
//! [`MetricsSink`](storefront_telemetry::MetricsSink):
//!
//! | Metric | Type | When |
//! |--------|------|------|
//! | `http.request.count` | counter | every completed request |
//! | `http.request.duration_ms` | distribution | every completed request |
//! | `http.response.bytes` | distribution | size known and non-zero |
//! | `http.request.server_error` | counter | status ≥ 500 |
//! | `http.request.client_error` | counter | 400 ≤ status < 500 |
//!
//! All carry the tags `method`, `route`, `status_code` and `status_family`.
//!
//! # Timing
//!
//! The start timestamp is taken when the request enters this stage. The
//! metrics are emitted when the response body has been fully handed to the
//! connection, not when the handler returns, so slow body writes count
//! towards latency. A response abandoned before its body completes reports
//! nothing. Responses without a body on the wire (HEAD, 1xx, 204, 304)
//! complete when the server releases them, and report no byte count.
//!
//! # Placement
//!
//! Register this stage before any stage that can rewrite the response
//! status, so the status observed here is the one the client gets.
//!
//! # Example
//!
//! ```rust,ignore
//! use storefront_middleware::stages::RequestMetricsMiddleware;
//!
//! let metrics = RequestMetricsMiddleware::new(guard.sink())
//!     .bypass_paths(["/health", "/ready"]);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use http::header::CONTENT_LENGTH;
use storefront_telemetry::SharedSink;

use crate::body::{is_bodiless, BodyCompletion, CompletionBody};
use crate::clock::{elapsed_ms, MonotonicClock, SharedClock};
use crate::context::MiddlewareContext;
use crate::event::MetricEvent;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::route::resolve_route;
use crate::types::{BoxBody, Request, Response};

/// Paths exempt from metrics unless configured otherwise.
pub const DEFAULT_BYPASS_PATHS: [&str; 2] = ["/health", "/ready"];

/// Middleware that emits per-request metrics.
#[derive(Clone)]
pub struct RequestMetricsMiddleware {
    sink: SharedSink,
    clock: SharedClock,
    bypass: HashSet<String>,
    enabled: bool,
}

impl RequestMetricsMiddleware {
    /// Creates the stage with the process monotonic clock and the default
    /// bypass set.
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink,
            clock: Arc::new(MonotonicClock::new()),
            bypass: DEFAULT_BYPASS_PATHS.iter().map(ToString::to_string).collect(),
            enabled: true,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the bypass set. Paths are compared without the query string.
    #[must_use]
    pub fn bypass_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bypass = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Turns the stage into a pass-through when `false`.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if requests to `path` skip metrics.
    pub fn is_bypassed(&self, path: &str) -> bool {
        !self.enabled || self.bypass.contains(path)
    }
}

impl std::fmt::Debug for RequestMetricsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMetricsMiddleware")
            .field("bypass", &self.bypass)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// What is fixed once the handler has produced the response head.
struct PendingEvent {
    method: String,
    route: String,
    status_code: u16,
    content_length: Option<u64>,
    bodiless: bool,
    start: std::time::Duration,
    request_id: String,
}

impl PendingEvent {
    fn complete(self, completion: BodyCompletion, sink: &SharedSink, clock: &SharedClock) {
        let event = MetricEvent {
            method: self.method,
            route: self.route,
            status_code: self.status_code,
            duration_ms: elapsed_ms(self.start, clock.now()),
            response_bytes: if self.bodiless {
                None
            } else {
                self.content_length.or(Some(completion.size()))
            },
        };

        let failures = event.emit(sink.as_ref());

        tracing::debug!(
            method = %event.method,
            route = %event.route,
            status = event.status_code,
            duration_ms = event.duration_ms,
            request_id = %self.request_id,
            failures,
            "request completed"
        );
    }
}

impl Middleware for RequestMetricsMiddleware {
    fn name(&self) -> &'static str {
        "request_metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.is_bypassed(request.uri().path()) {
                return next.run(ctx, request).await;
            }

            let start = self.clock.now();
            let request_method = request.method().clone();
            let method = request_method.as_str().to_uppercase();
            let path = request.uri().path().to_string();

            let response = next.run(ctx, request).await;

            let (parts, body) = response.into_parts();
            let bodiless = is_bodiless(&request_method, parts.status);
            let pending = PendingEvent {
                method,
                route: resolve_route(&path, ctx.matched_route(), ctx.mount_path()),
                status_code: parts.status.as_u16(),
                content_length: parts
                    .headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok()),
                bodiless,
                start,
                request_id: ctx.request_id().to_string(),
            };

            let sink = Arc::clone(&self.sink);
            let clock = Arc::clone(&self.clock);
            let body = CompletionBody::new(body, move |completion| {
                pending.complete(completion, &sink, &clock);
            })
            .bodiless(bodiless);

            Response::from_parts(parts, BoxBody::new(body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::full;
    use bytes::Bytes;
    use http::{Request as HttpRequest, Response as HttpResponse, StatusCode};
    use http_body_util::{BodyExt, Full};
    use std::time::Duration;
    use storefront_telemetry::names;
    use storefront_telemetry::testing::RecordingSink;

    fn request(uri: &str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn respond<'a>(status: StatusCode, body: &'static str) -> Next<'a> {
        Next::handler(move |_ctx, _req| {
            Box::pin(async move {
                HttpResponse::builder()
                    .status(status)
                    .body(full(body))
                    .unwrap()
            })
        })
    }

    async fn drain(response: Response) {
        response.into_body().collect().await.unwrap();
    }

    #[tokio::test]
    async fn test_emits_after_body_completes() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();

        let response = stage
            .process(&mut ctx, request("/orders/42"), respond(StatusCode::CREATED, "done"))
            .await;
        assert!(sink.is_empty());

        drain(response).await;

        let count = sink.find(names::REQUEST_COUNT).unwrap();
        assert_eq!(count.tag("method"), Some("POST"));
        assert_eq!(count.tag("route"), Some("/orders/:id"));
        assert_eq!(count.tag("status_code"), Some("201"));
        assert_eq!(count.tag("status_family"), Some("2xx"));
        assert_eq!(sink.find(names::RESPONSE_BYTES).unwrap().value, 4.0);
    }

    #[tokio::test]
    async fn test_uses_matched_route_and_mount_path() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();
        ctx.set_mount_path("/api");
        ctx.set_matched_route("/games/:slug");

        let response = stage
            .process(&mut ctx, request("/api/games/zelda"), respond(StatusCode::OK, "ok"))
            .await;
        drain(response).await;

        assert_eq!(
            sink.find(names::REQUEST_COUNT).unwrap().tag("route"),
            Some("/api/games/:slug")
        );
    }

    #[tokio::test]
    async fn test_bypassed_paths_emit_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();

        let response = stage
            .process(&mut ctx, request("/health?verbose=1"), respond(StatusCode::OK, "ok"))
            .await;
        drain(response).await;

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_stage_passes_through() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone()).enabled(false);
        let mut ctx = MiddlewareContext::new();

        let response = stage
            .process(&mut ctx, request("/orders"), respond(StatusCode::OK, "ok"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        drain(response).await;

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_duration_from_manual_clock() {
        let sink = Arc::new(RecordingSink::new());
        let clock = Arc::new(ManualClock::new());
        let stage = RequestMetricsMiddleware::new(sink.clone()).with_clock(clock.clone());
        let mut ctx = MiddlewareContext::new();

        let handler_clock = clock.clone();
        let next = Next::handler(move |_ctx, _req| {
            handler_clock.advance(Duration::from_millis(100));
            Box::pin(async { HttpResponse::new(full("slow")) })
        });

        let response = stage.process(&mut ctx, request("/cart"), next).await;
        // Time spent sending the body counts.
        clock.advance(Duration::from_millis(50));
        drain(response).await;

        assert_eq!(sink.find(names::REQUEST_DURATION_MS).unwrap().value, 150.0);
    }

    #[tokio::test]
    async fn test_content_length_header_wins() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                HttpResponse::builder()
                    .header(CONTENT_LENGTH, "2048")
                    .body(crate::types::empty())
                    .unwrap()
            })
        });
        let response = stage.process(&mut ctx, request("/download"), next).await;
        drain(response).await;

        assert_eq!(sink.find(names::RESPONSE_BYTES).unwrap().value, 2048.0);
    }

    #[tokio::test]
    async fn test_aborted_response_emits_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();

        let response = stage
            .process(&mut ctx, request("/orders"), respond(StatusCode::OK, "unsent"))
            .await;
        drop(response);

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_head_response_dropped_unread_is_counted() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();

        let head = HttpRequest::builder()
            .method("HEAD")
            .uri("/orders/7")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = stage
            .process(&mut ctx, head, respond(StatusCode::OK, "{\"id\":7}"))
            .await;
        drop(response);

        let count = sink.find(names::REQUEST_COUNT).unwrap();
        assert_eq!(count.tag("method"), Some("HEAD"));
        assert_eq!(count.tag("status_code"), Some("200"));
        assert_eq!(sink.count(names::REQUEST_DURATION_MS), 1);
        assert_eq!(sink.count(names::RESPONSE_BYTES), 0);
    }

    #[tokio::test]
    async fn test_not_modified_counts_without_bytes() {
        let sink = Arc::new(RecordingSink::new());
        let stage = RequestMetricsMiddleware::new(sink.clone());
        let mut ctx = MiddlewareContext::new();

        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                HttpResponse::builder()
                    .status(StatusCode::NOT_MODIFIED)
                    .header(CONTENT_LENGTH, "512")
                    .body(full("stale cached copy"))
                    .unwrap()
            })
        });
        let response = stage.process(&mut ctx, request("/catalog"), next).await;
        drop(response);

        let count = sink.find(names::REQUEST_COUNT).unwrap();
        assert_eq!(count.tag("status_code"), Some("304"));
        assert_eq!(count.tag("status_family"), Some("3xx"));
        assert_eq!(sink.count(names::RESPONSE_BYTES), 0);
        assert_eq!(sink.count(names::CLIENT_ERROR), 0);
    }

    #[test]
    fn test_custom_bypass_set() {
        let stage = RequestMetricsMiddleware::new(Arc::new(RecordingSink::new()))
            .bypass_paths(["/internal/ping"]);
        assert!(stage.is_bypassed("/internal/ping"));
        assert!(!stage.is_bypassed("/health"));
        assert_eq!(stage.name(), "request_metrics");
    }
}
