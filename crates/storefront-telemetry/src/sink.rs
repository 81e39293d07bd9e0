//! The metrics sink abstraction.
//!
//! A sink receives counters and distribution samples and forwards them to
//! an external collector. Sinks are configured once (destination, prefix,
//! global tags) and then shared by every in-flight request, so every
//! implementation must be safe for concurrent use and must never block the
//! caller waiting for an acknowledgement.
//!
//! ```
//! use storefront_telemetry::{MetricsSink, NoopSink, Tag};
//!
//! let sink = NoopSink;
//! let tags = [Tag::new("method", "GET"), Tag::new("route", "/orders/:id")];
//! sink.increment("http.request.count", 1, &tags).unwrap();
//! sink.distribution("http.request.duration_ms", 12.5, &tags).unwrap();
//! sink.close().unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::SinkError;

/// A `key:value` metric tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parses a `key:value` string. The first `:` separates key and value, so
    /// values may themselves contain colons (`route:/orders/:id`).
    ///
    /// Returns `None` if there is no separator or the key is empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once(':')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, value.trim()))
    }

    /// Returns the tag key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the tag value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// A destination for operational metrics.
///
/// # Contract
///
/// - Calls are fire-and-forget: they hand the metric to a transport and
///   return without waiting for delivery.
/// - Failures are reported as [`SinkError`]; callers treat them as non-fatal.
/// - Process-wide tags are the sink's business: callers pass only the tags
///   specific to the event.
pub trait MetricsSink: Send + Sync + 'static {
    /// Increments the counter `name` by `value`.
    fn increment(&self, name: &str, value: u64, tags: &[Tag]) -> Result<(), SinkError>;

    /// Records one sample of the distribution `name`.
    fn distribution(&self, name: &str, value: f64, tags: &[Tag]) -> Result<(), SinkError>;

    /// Drains any buffered writes and stops accepting metrics.
    fn close(&self) -> Result<(), SinkError>;
}

/// A sink shared between the telemetry guard and every request.
pub type SharedSink = Arc<dyn MetricsSink>;

/// A sink that drops everything. Used when metrics are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment(&self, _name: &str, _value: u64, _tags: &[Tag]) -> Result<(), SinkError> {
        Ok(())
    }

    fn distribution(&self, _name: &str, _value: f64, _tags: &[Tag]) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards every metric to several sinks.
///
/// All sinks are always called; the first error encountered is returned.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    /// Creates a fan-out over the given sinks.
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }

    /// Returns the number of downstream sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there are no downstream sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn MetricsSink) -> Result<(), SinkError>) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = f(sink.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl MetricsSink for FanoutSink {
    fn increment(&self, name: &str, value: u64, tags: &[Tag]) -> Result<(), SinkError> {
        self.each(|sink| sink.increment(name, value, tags))
    }

    fn distribution(&self, name: &str, value: f64, tags: &[Tag]) -> Result<(), SinkError> {
        self.each(|sink| sink.distribution(name, value, tags))
    }

    fn close(&self) -> Result<(), SinkError> {
        self.each(|sink| sink.close())
    }
}
