//! DogStatsD sink, built on the [`cadence`] StatsD client.
//!
//! Metrics go out in the DogStatsD line protocol:
//!
//! ```text
//! ecommerce.http.request.count:1|c|#method:GET,route:/orders/:id,env:dev
//! ecommerce.http.request.duration_ms:12.5|h|#method:GET,route:/orders/:id,env:dev
//! ```
//!
//! The client writes from a [`QueuingMetricSink`] worker thread, so callers
//! never wait on the socket. With `max_buffer_size > 0` the worker writes into
//! a [`BufferedUdpMetricSink`], which coalesces lines into newline-separated
//! datagrams; the optional periodic flush task pushes out partial buffers.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::panic::RefUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cadence::prelude::*;
use cadence::{
    BufferedUdpMetricSink, MetricResult, MetricSink, QueuingMetricSink, StatsdClient,
    UdpMetricSink,
};
use parking_lot::RwLock;

use crate::config::{SampleType, StatsdConfig};
use crate::error::{SinkError, TelemetryError};
use crate::sink::{MetricsSink, Tag};
use crate::TelemetryResult;

/// A [`MetricsSink`] that sends DogStatsD metrics over UDP.
pub struct StatsdSink {
    client: RwLock<Option<StatsdClient>>,
    target: SocketAddr,
    prefix: String,
    sample_type: SampleType,
    buffered: bool,
}

impl StatsdSink {
    /// Creates a sink from its configuration.
    ///
    /// `global_tags` are attached to every metric by the client.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidAddress`] if the agent host cannot be
    /// resolved, [`TelemetryError::Io`] if the socket cannot be set up, or
    /// [`TelemetryError::Statsd`] if the client rejects the socket.
    pub fn new(config: &StatsdConfig, global_tags: &[Tag]) -> TelemetryResult<Self> {
        let target = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| {
                TelemetryError::InvalidAddress(format!("{}:{}: {e}", config.host, config.port))
            })?
            .next()
            .ok_or_else(|| {
                TelemetryError::InvalidAddress(format!(
                    "{}:{}: no addresses resolved",
                    config.host, config.port
                ))
            })?;

        let socket = UdpSocket::bind(if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" })?;
        socket.set_nonblocking(true)?;

        let prefix = config.prefix.trim_end_matches('.');
        let buffered = config.max_buffer_size > 0;
        let client = if buffered {
            let udp = BufferedUdpMetricSink::with_capacity(target, socket, config.max_buffer_size)?;
            build_client(prefix, udp, global_tags)
        } else {
            build_client(prefix, UdpMetricSink::from(target, socket)?, global_tags)
        };

        Ok(Self {
            client: RwLock::new(Some(client)),
            target,
            prefix: config.prefix.clone(),
            sample_type: config.sample_type,
            buffered,
        })
    }

    /// Returns the agent address metrics are sent to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Returns true once [`MetricsSink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }

    /// Asks the client to write out any buffered lines.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.with_client("flush", StatsdClient::flush)
    }

    /// Spawns a task on the current Tokio runtime that flushes the buffer
    /// every `interval`. The task holds only a weak reference and exits once
    /// the sink is closed or dropped.
    ///
    /// Returns `None` when called outside a runtime or when buffering is off.
    pub fn spawn_flush_task(
        self: &Arc<Self>,
        interval: Duration,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if !self.buffered {
            return None;
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let sink: Weak<Self> = Arc::downgrade(self);

        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(sink) = sink.upgrade() else { break };
                if sink.is_closed() {
                    break;
                }
                if let Err(e) = sink.flush() {
                    tracing::warn!(error = %e, "statsd periodic flush failed");
                }
            }
        }))
    }

    fn with_client<F>(&self, name: &str, send: F) -> Result<(), SinkError>
    where
        F: FnOnce(&StatsdClient) -> MetricResult<()>,
    {
        let client = self.client.read();
        let client = client.as_ref().ok_or(SinkError::Closed)?;
        send(client).map_err(|source| SinkError::Client {
            metric: format!("{}{name}", self.prefix),
            source,
        })
    }
}

fn build_client<S>(prefix: &str, udp: S, global_tags: &[Tag]) -> StatsdClient
where
    S: MetricSink + Send + Sync + RefUnwindSafe + 'static,
{
    global_tags
        .iter()
        .fold(
            StatsdClient::builder(prefix, QueuingMetricSink::from(udp)),
            |builder, tag| builder.with_tag(sanitize(tag.key()), sanitize(tag.value())),
        )
        .build()
}

/// Tag keys and values, with the DogStatsD separators replaced.
fn sanitized(tags: &[Tag]) -> Vec<(String, String)> {
    tags.iter()
        .map(|tag| (sanitize(tag.key()), sanitize(tag.value())))
        .collect()
}

fn sanitize(raw: &str) -> String {
    raw.replace(['|', ',', '#', '\n', '\r'], "_")
}

impl MetricsSink for StatsdSink {
    fn increment(&self, name: &str, value: u64, tags: &[Tag]) -> Result<(), SinkError> {
        let value = i64::try_from(value)
            .map_err(|_| SinkError::Rejected(format!("{name}: counter value {value} out of range")))?;
        let tags = sanitized(tags);

        self.with_client(name, |client| {
            let mut metric = client.count_with_tags(name, value);
            for (key, val) in &tags {
                metric = metric.with_tag(key, val);
            }
            metric.try_send().map(drop)
        })
    }

    fn distribution(&self, name: &str, value: f64, tags: &[Tag]) -> Result<(), SinkError> {
        if !value.is_finite() {
            return Err(SinkError::Rejected(format!("{name}: non-finite sample {value}")));
        }
        let tags = sanitized(tags);

        self.with_client(name, |client| match self.sample_type {
            SampleType::Histogram => {
                let mut metric = client.histogram_with_tags(name, value);
                for (key, val) in &tags {
                    metric = metric.with_tag(key, val);
                }
                metric.try_send().map(drop)
            }
            SampleType::Distribution => {
                let mut metric = client.distribution_with_tags(name, value);
                for (key, val) in &tags {
                    metric = metric.with_tag(key, val);
                }
                metric.try_send().map(drop)
            }
        })
    }

    /// Stops accepting metrics and drops the client, which lets the queue
    /// worker drain what is left and flush the buffer.
    fn close(&self) -> Result<(), SinkError> {
        drop(self.client.write().take());
        Ok(())
    }
}

impl fmt::Debug for StatsdSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdSink")
            .field("target", &self.target)
            .field("prefix", &self.prefix)
            .field("sample_type", &self.sample_type)
            .field("buffered", &self.buffered)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    fn config_for(receiver: &UdpSocket, max_buffer_size: usize) -> StatsdConfig {
        StatsdConfig {
            host: "127.0.0.1".to_string(),
            port: receiver.local_addr().unwrap().port(),
            max_buffer_size,
            ..StatsdConfig::default()
        }
    }

    fn recv_lines(socket: &UdpSocket) -> Vec<String> {
        let mut buf = [0u8; 2048];
        let n = socket.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Splits a line into its `name:value|type` head and its tag set.
    fn split_line(line: &str) -> (String, BTreeSet<String>) {
        match line.split_once("|#") {
            Some((head, tags)) => (head.to_string(), tags.split(',').map(str::to_string).collect()),
            None => (line.to_string(), BTreeSet::new()),
        }
    }

    fn tag_set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_sends_counter_with_prefix_and_global_tags() {
        let rx = receiver();
        let sink = StatsdSink::new(
            &config_for(&rx, 0),
            &[Tag::new("env", "test"), Tag::new("service", "shop")],
        )
        .unwrap();

        sink.increment("http.request.count", 1, &[Tag::new("method", "POST")])
            .unwrap();

        let lines = recv_lines(&rx);
        assert_eq!(lines.len(), 1);
        let (head, tags) = split_line(&lines[0]);
        assert_eq!(head, "ecommerce.http.request.count:1|c");
        assert_eq!(tags, tag_set(&["method:POST", "env:test", "service:shop"]));
    }

    #[test]
    fn test_histogram_is_the_default_sample_type() {
        let rx = receiver();
        let sink = StatsdSink::new(&config_for(&rx, 0), &[]).unwrap();

        sink.distribution("http.request.duration_ms", 12.5, &[]).unwrap();
        assert_eq!(recv_lines(&rx), ["ecommerce.http.request.duration_ms:12.5|h"]);
    }

    #[test]
    fn test_distribution_uses_configured_sample_type() {
        let rx = receiver();
        let mut config = config_for(&rx, 0);
        config.sample_type = SampleType::Distribution;
        let sink = StatsdSink::new(&config, &[]).unwrap();

        sink.distribution("http.request.duration_ms", 42.0, &[]).unwrap();
        assert_eq!(recv_lines(&rx), ["ecommerce.http.request.duration_ms:42|d"]);
    }

    #[test]
    fn test_tag_separators_are_replaced() {
        let rx = receiver();
        let sink = StatsdSink::new(&config_for(&rx, 0), &[]).unwrap();

        sink.increment("hits", 1, &[Tag::new("route", "/a|b,c#d")]).unwrap();

        let (_, tags) = split_line(&recv_lines(&rx)[0]);
        assert_eq!(tags, tag_set(&["route:/a_b_c_d"]));
    }

    #[test]
    fn test_non_finite_sample_is_rejected() {
        let rx = receiver();
        let sink = StatsdSink::new(&config_for(&rx, 0), &[]).unwrap();
        let result = sink.distribution("http.request.duration_ms", f64::NAN, &[]);
        assert!(matches!(result, Err(SinkError::Rejected(_))));
    }

    #[test]
    fn test_buffered_lines_are_coalesced_and_drained_on_close() {
        let rx = receiver();
        let sink = StatsdSink::new(&config_for(&rx, 1024), &[]).unwrap();

        sink.increment("a", 1, &[]).unwrap();
        sink.increment("b", 2, &[]).unwrap();
        sink.close().unwrap();

        assert_eq!(recv_lines(&rx), ["ecommerce.a:1|c", "ecommerce.b:2|c"]);
    }

    #[test]
    fn test_closed_sink_rejects_metrics() {
        let rx = receiver();
        let sink = StatsdSink::new(&config_for(&rx, 0), &[]).unwrap();

        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(
            sink.increment("http.request.count", 1, &[]),
            Err(SinkError::Closed)
        ));
        assert!(matches!(sink.flush(), Err(SinkError::Closed)));
        // Closing twice is harmless.
        assert!(sink.close().is_ok());
    }

    #[test]
    fn test_unresolvable_host_is_an_error() {
        let config = StatsdConfig {
            host: "definitely not a host name".to_string(),
            ..StatsdConfig::default()
        };
        assert!(matches!(
            StatsdSink::new(&config, &[]),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_flush_task_not_spawned_when_unbuffered() {
        let rx = receiver();
        let sink = Arc::new(StatsdSink::new(&config_for(&rx, 0), &[]).unwrap());
        assert!(sink.spawn_flush_task(Duration::from_millis(10)).is_none());
    }

    #[tokio::test]
    async fn test_flush_task_drains_buffer() {
        let rx = receiver();
        let sink = Arc::new(StatsdSink::new(&config_for(&rx, 1024), &[]).unwrap());
        let task = sink.spawn_flush_task(Duration::from_millis(20)).unwrap();

        sink.increment("periodic", 1, &[]).unwrap();

        let lines = tokio::task::spawn_blocking(move || recv_lines(&rx))
            .await
            .unwrap();
        assert_eq!(lines, ["ecommerce.periodic:1|c"]);

        sink.close().unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
