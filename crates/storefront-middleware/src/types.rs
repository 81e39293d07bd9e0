//! Common types used throughout the middleware pipeline.
//!
//! Requests arrive with their body already collected. Responses carry a
//! boxed body so stages can wrap it (the request metrics stage does, to
//! observe when the body has been fully sent).

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use std::convert::Infallible;

/// A boxed HTTP body.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<BoxBody>;

/// Boxes a complete in-memory body.
pub fn full(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).boxed()
}

/// Boxes an empty body.
pub fn empty() -> BoxBody {
    Empty::<Bytes>::new().boxed()
}

/// Extension trait for building error responses.
pub trait ResponseExt {
    /// Creates an error response with the given status code and message.
    fn error(status: http::StatusCode, message: &str) -> Response;

    /// Creates a JSON error response.
    fn json_error(status: http::StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn error(status: http::StatusCode, message: &str) -> Response {
        let mut response = http::Response::new(full(message.to_string()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    fn json_error(status: http::StatusCode, code: &str, message: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });

        let mut response = http::Response::new(full(body.to_string()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        response
    }
}
