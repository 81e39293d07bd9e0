//! Response body wrapper that reports when the body has been fully sent.
//!
//! The server drops a response body once it has written the last frame (or
//! has given up on the connection). [`CompletionBody`] counts the data it
//! yields and, when dropped, runs its callback only if the inner body reached
//! end of stream. An aborted response therefore reports nothing.
//!
//! Responses to HEAD, and 1xx/204/304 responses, carry no body on the wire.
//! The server drops those bodies unread once the head is written, so a
//! [`CompletionBody::bodiless`] wrapper reports completion on drop with zero
//! streamed bytes.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{Method, StatusCode};
use hyper::body::{Body, Frame, SizeHint};

use crate::types::BoxBody;

/// What is known about a body at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyCompletion {
    /// Data bytes actually yielded.
    pub streamed_bytes: u64,
    /// Exact size advertised by the body when it was wrapped.
    pub exact_size: Option<u64>,
}

impl BodyCompletion {
    /// Best known body size: the advertised exact size, else what was streamed.
    pub fn size(&self) -> u64 {
        self.exact_size.unwrap_or(self.streamed_bytes)
    }
}

/// Returns true if a response to `method` with `status` is complete once its
/// head has been written.
pub fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

type OnComplete = Box<dyn FnOnce(BodyCompletion) + Send + Sync>;

/// A body that calls back once, after the wrapped body completes.
pub struct CompletionBody {
    inner: BoxBody,
    exact_size: Option<u64>,
    streamed_bytes: u64,
    finished: bool,
    bodiless: bool,
    on_complete: Option<OnComplete>,
}

impl CompletionBody {
    /// Wraps `inner`; `on_complete` runs at most once.
    pub fn new<F>(inner: BoxBody, on_complete: F) -> Self
    where
        F: FnOnce(BodyCompletion) + Send + Sync + 'static,
    {
        let exact_size = inner.size_hint().exact();
        Self {
            inner,
            exact_size,
            streamed_bytes: 0,
            finished: false,
            bodiless: false,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    /// Marks the response as having no body on the wire: the callback fires
    /// on drop whether or not the inner body was read, and reports no
    /// advertised size.
    #[must_use]
    pub fn bodiless(mut self, bodiless: bool) -> Self {
        self.bodiless = bodiless;
        if bodiless {
            self.exact_size = None;
        }
        self
    }

    fn completed(&self) -> bool {
        self.bodiless || self.finished || self.inner.is_end_stream()
    }
}

impl Body for CompletionBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.streamed_bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        if !self.completed() {
            return;
        }
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(BodyCompletion {
                streamed_bytes: self.streamed_bytes,
                exact_size: self.exact_size,
            });
        }
    }
}

impl std::fmt::Debug for CompletionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionBody")
            .field("exact_size", &self.exact_size)
            .field("streamed_bytes", &self.streamed_bytes)
            .field("finished", &self.finished)
            .field("bodiless", &self.bodiless)
            .finish_non_exhaustive()
    }
}
