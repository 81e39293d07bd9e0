//! In-memory sink for tests.
//!
//! [`RecordingSink`] keeps every call it receives and can be switched into a
//! failing or panicking mode to exercise error containment in callers.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SinkError;
use crate::sink::{MetricsSink, Tag};

/// Kind of a recorded metric call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// `increment` call.
    Counter,
    /// `distribution` call.
    Distribution,
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    /// Call kind.
    pub kind: MetricKind,
    /// Metric name as passed by the caller.
    pub name: String,
    /// Value (counters are widened to `f64`).
    pub value: f64,
    /// Call tags.
    pub tags: Vec<Tag>,
}

impl RecordedMetric {
    /// Returns the value of tag `key`, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.key() == key).map(Tag::value)
    }
}

/// What the sink does after recording a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Accept the call.
    #[default]
    Accept,
    /// Return an emission error.
    Fail,
    /// Panic.
    Panic,
}

/// A spy sink.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<RecordedMetric>>,
    behavior: Mutex<Behavior>,
    closed: AtomicBool,
}

impl RecordingSink {
    /// Creates an accepting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink with the given behavior.
    pub fn with_behavior(behavior: Behavior) -> Self {
        let sink = Self::default();
        sink.set_behavior(behavior);
        sink
    }

    /// Changes the behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    /// Returns a snapshot of every recorded call, in order.
    pub fn calls(&self) -> Vec<RecordedMetric> {
        self.calls.lock().clone()
    }

    /// Returns the recorded metric names, in order.
    pub fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.name.clone()).collect()
    }

    /// Returns how many calls were made for `name`.
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.name == name).count()
    }

    /// Returns the first call for `name`.
    pub fn find(&self, name: &str) -> Option<RecordedMetric> {
        self.calls.lock().iter().find(|c| c.name == name).cloned()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, kind: MetricKind, name: &str, value: f64, tags: &[Tag]) -> Result<(), SinkError> {
        self.calls.lock().push(RecordedMetric {
            kind,
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });

        let behavior = *self.behavior.lock();
        match behavior {
            Behavior::Accept => Ok(()),
            Behavior::Fail => Err(SinkError::emission(
                name,
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "agent unreachable"),
            )),
            Behavior::Panic => panic!("recording sink told to panic on {name}"),
        }
    }
}

impl MetricsSink for RecordingSink {
    #[allow(clippy::cast_precision_loss)]
    fn increment(&self, name: &str, value: u64, tags: &[Tag]) -> Result<(), SinkError> {
        self.record(MetricKind::Counter, name, value as f64, tags)
    }

    fn distribution(&self, name: &str, value: f64, tags: &[Tag]) -> Result<(), SinkError> {
        self.record(MetricKind::Distribution, name, value, tags)
    }

    fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
