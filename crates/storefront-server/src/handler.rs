//! Handler registration and dispatch.
//!
//! Handlers are registered against the operation ID of a route. Three
//! shapes are supported:
//!
//! - **JSON**: the request body is deserialized into `Req`, the returned
//!   `Res` is serialized with `200 OK`
//! - **No body**: like JSON, without reading the request body
//! - **Raw**: full access to the request and the response
//!
//! Failures become JSON error envelopes:
//!
//! ```json
//! { "error": { "code": "VALIDATION_ERROR", "message": "...", "operation_id": "createOrder" } }
//! ```
//!
//! # Example
//!
//! ```rust
//! use storefront_server::{HandlerContext, HandlerError, HandlerRegistry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct AddToCart { product_id: u64, quantity: u32 }
//!
//! #[derive(Serialize)]
//! struct CartLine { product_id: u64, quantity: u32 }
//!
//! async fn add_to_cart(_ctx: HandlerContext, req: AddToCart) -> Result<CartLine, HandlerError> {
//!     if req.quantity == 0 {
//!         return Err(HandlerError::bad_request("quantity must be positive"));
//!     }
//!     Ok(CartLine { product_id: req.product_id, quantity: req.quantity })
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("addToCart", add_to_cart);
//! assert!(registry.contains("addToCart"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::{de::DeserializeOwned, Serialize};
use storefront_middleware::types::full;
use storefront_middleware::{BoxFuture, Request, RequestId, Response};
use thiserror::Error;

use crate::router::RouteMatch;

/// Type alias for boxed handler result.
pub type BoxedHandlerResult = BoxFuture<'static, Result<Response, HandlerError>>;

/// A type-erased handler function.
pub type ErasedHandler = Arc<dyn Fn(HandlerContext, Request) -> BoxedHandlerResult + Send + Sync>;

/// What a handler knows about the request besides the request itself.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    request_id: RequestId,
    route: Option<RouteMatch>,
}

impl HandlerContext {
    /// Creates a context.
    #[must_use]
    pub const fn new(request_id: RequestId, route: Option<RouteMatch>) -> Self {
        Self { request_id, route }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the matched route.
    #[must_use]
    pub const fn route(&self) -> Option<&RouteMatch> {
        self.route.as_ref()
    }

    /// Returns a path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.as_ref().and_then(|r| r.param(name))
    }

    /// Returns the operation ID of the matched route.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.route.as_ref().map(RouteMatch::operation_id)
    }
}

/// Handler error type.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request body could not be deserialized.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The response could not be serialized.
    #[error("failed to serialize response: {0}")]
    Serialization(String),

    /// An error with an explicit status.
    #[error("{message}")]
    Status {
        /// HTTP status to respond with.
        status: StatusCode,
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Any other failure; reported as 500.
    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// An error with an explicit status and code.
    pub fn status(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// `400 Bad Request`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Wraps any error as a 500.
    pub fn internal(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Internal(err.into())
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Serialization(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Status { status, .. } => *status,
        }
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidBody(_) => "VALIDATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Status { code, .. } => code,
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Renders the JSON error envelope.
    #[must_use]
    pub fn into_response(self, operation_id: &str) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Internal details stay in the logs.
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": message,
                "operation_id": operation_id
            }
        });
        json_response(status, body.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidBody(err.to_string())
    }
}

/// Builds a response with a JSON content type.
pub(crate) fn json_response(status: StatusCode, body: impl Into<bytes::Bytes>) -> Response {
    let mut response = http::Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn serialize<Res: Serialize>(value: &Res) -> Result<Response, HandlerError> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| HandlerError::Serialization(e.to_string()))?;
    Ok(json_response(StatusCode::OK, bytes))
}

/// Registry for operation handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ErasedHandler>,
}

impl HandlerRegistry {
    /// Creates a new empty handler registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a JSON handler.
    pub fn register<Req, Res, F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + 'static,
        F: Fn(HandlerContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: HandlerContext, request: Request| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let body = match request.into_body().collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(never) => match never {},
                };
                let request: Req = serde_json::from_slice(&body)?;
                let response = handler(ctx, request).await?;
                serialize(&response)
            })
        });

        self.handlers.insert(operation_id.into(), erased);
    }

    /// Registers a JSON handler that ignores the request body.
    pub fn register_no_body<Res, F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        Res: Serialize + Send + 'static,
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: HandlerContext, _request: Request| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let response = handler(ctx).await?;
                serialize(&response)
            })
        });

        self.handlers.insert(operation_id.into(), erased);
    }

    /// Registers a handler that builds its own response.
    pub fn register_raw<F, Fut>(&mut self, operation_id: impl Into<String>, handler: F)
    where
        F: Fn(HandlerContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: ErasedHandler = Arc::new(move |ctx: HandlerContext, request: Request| {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(ctx, request).await })
        });

        self.handlers.insert(operation_id.into(), erased);
    }

    /// Looks up a handler by operation ID.
    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&ErasedHandler> {
        self.handlers.get(operation_id)
    }

    /// Checks if a handler is registered for an operation.
    #[must_use]
    pub fn contains(&self, operation_id: &str) -> bool {
        self.handlers.contains_key(operation_id)
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes the handler for `operation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::HandlerNotFound`] if nothing is registered, or
    /// the handler's own error.
    pub async fn invoke(
        &self,
        operation_id: &str,
        ctx: HandlerContext,
        request: Request,
    ) -> Result<Response, InvokeError> {
        let handler = self
            .handlers
            .get(operation_id)
            .ok_or_else(|| InvokeError::HandlerNotFound(operation_id.to_string()))?;

        handler(ctx, request).await.map_err(InvokeError::Handler)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Error returned when invoking a handler fails.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// No handler registered for the operation.
    #[error("no handler registered for operation: {0}")]
    HandlerNotFound(String),

    /// Handler execution failed.
    #[error(transparent)]
    Handler(HandlerError),
}
