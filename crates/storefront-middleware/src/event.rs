//! The per-request metric event and its emission.

use std::panic::{catch_unwind, AssertUnwindSafe};

use storefront_telemetry::{names, MetricsSink, SinkError, Tag};

/// Everything reported about one completed HTTP exchange.
///
/// Built once the response body has been fully sent, emitted, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    /// HTTP verb, uppercase.
    pub method: String,
    /// Normalized route template, e.g. `/orders/:id`.
    pub route: String,
    /// Final status code.
    pub status_code: u16,
    /// Elapsed time from arrival to completion, in milliseconds.
    pub duration_ms: f64,
    /// Response body size, when known.
    pub response_bytes: Option<u64>,
}

/// Returns the status class label, e.g. `404` → `"4xx"`.
pub fn status_family(status: u16) -> String {
    format!("{}xx", status / 100)
}

impl MetricEvent {
    /// Returns the status class label.
    pub fn status_family(&self) -> String {
        status_family(self.status_code)
    }

    /// Returns the event tags: `method`, `route`, `status_code`, `status_family`.
    pub fn tags(&self) -> Vec<Tag> {
        vec![
            Tag::new("method", &self.method),
            Tag::new("route", &self.route),
            Tag::new("status_code", self.status_code.to_string()),
            Tag::new("status_family", self.status_family()),
        ]
    }

    /// Emits the event to `sink`.
    ///
    /// In order: the request counter, the duration sample, the response size
    /// sample when known and non-zero, then one of the server or client error
    /// counters when the status calls for it. A failing or panicking call is
    /// logged and the remaining calls still run.
    ///
    /// Returns the number of calls that did not succeed.
    #[allow(clippy::cast_precision_loss)]
    pub fn emit(&self, sink: &dyn MetricsSink) -> usize {
        let tags = self.tags();
        let mut failures = 0;

        let mut guarded = |metric: &str, call: &dyn Fn() -> Result<(), SinkError>| {
            match catch_unwind(AssertUnwindSafe(call)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(metric, error = %e, "failed to emit request metric");
                }
                Err(panic) => {
                    failures += 1;
                    tracing::warn!(
                        metric,
                        error = panic_message(panic.as_ref()),
                        "metrics sink panicked"
                    );
                }
            }
        };

        guarded(names::REQUEST_COUNT, &|| {
            sink.increment(names::REQUEST_COUNT, 1, &tags)
        });
        guarded(names::REQUEST_DURATION_MS, &|| {
            sink.distribution(names::REQUEST_DURATION_MS, self.duration_ms, &tags)
        });
        if let Some(bytes) = self.response_bytes.filter(|b| *b > 0) {
            guarded(names::RESPONSE_BYTES, &|| {
                sink.distribution(names::RESPONSE_BYTES, bytes as f64, &tags)
            });
        }
        if self.status_code >= 500 {
            guarded(names::SERVER_ERROR, &|| {
                sink.increment(names::SERVER_ERROR, 1, &tags)
            });
        } else if self.status_code >= 400 {
            guarded(names::CLIENT_ERROR, &|| {
                sink.increment(names::CLIENT_ERROR, 1, &tags)
            });
        }

        failures
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
