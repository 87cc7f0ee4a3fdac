// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::dropped;
use crate::error::Result;
use crate::stats::StatsCollector;
use crate::transport::{Connector, TcpConnector};
use crate::{DropReason, EmitterConfig, EmitterStats, Record};

/// Observable state of an emitter's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; the next `log` call will attempt a connect.
    Unconnected,
    /// No socket, and the reconnect throttle is closed until the next window.
    Connecting,
    /// A socket is live and its last connect or write succeeded.
    Connected,
}

/// Connection state guarded by the emitter's lock.
///
/// `stream` is `Some` only between a successful connect and the next failed
/// write; it is replaced, never repaired.
struct Link<S> {
    stream: Option<S>,
    next_attempt: Option<Instant>,
    buf: Vec<u8>,
}

impl<S: Write> Link<S> {
    fn gate_open(&self, now: Instant) -> bool {
        self.next_attempt.map_or(true, |at| now >= at)
    }

    /// Makes sure a stream is live, connecting if the throttle allows it.
    fn ensure_connected<C>(
        &mut self,
        connector: &C,
        config: &EmitterConfig,
        stats: &StatsCollector,
    ) -> std::result::Result<(), DropReason>
    where
        C: Connector<Stream = S>,
    {
        if self.stream.is_some() {
            return Ok(());
        }

        let now = Instant::now();
        if !self.gate_open(now) {
            return Err(DropReason::Throttled);
        }
        self.next_attempt = Some(now + config.get_reconnect_interval());

        match connector.connect(config) {
            Ok(stream) => {
                stats.record_connect(true);
                log::debug!(
                    "Connected to metric collector at {}:{}",
                    config.get_address(),
                    config.get_port()
                );
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                stats.record_connect(false);
                log::debug!(
                    "Metric collector at {}:{} unavailable: {}",
                    config.get_address(),
                    config.get_port(),
                    e
                );
                Err(e.reason())
            }
        }
    }

    /// Writes the encoded record in `buf` with a single write call, dropping
    /// the stream on any failure.
    ///
    /// A short write counts as a failure: retrying would wait for the send
    /// timeout a second time.
    fn write_record(&mut self, stats: &StatsCollector) -> std::result::Result<(), DropReason> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(DropReason::Throttled);
        };

        let len = self.buf.len();
        let written = match stream.write(&self.buf) {
            Ok(n) if n == len => stream.flush(),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {n} of {len} bytes"),
            )),
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => {
                stats.record_sent(len);
                Ok(())
            }
            Err(e) => {
                // A partially written record is never resumed on another socket.
                self.stream = None;
                stats.record_write_failure();
                log::debug!("Metric collector write failed, dropping connection: {}", e);
                Err(DropReason::Write)
            }
        }
    }
}

pub(crate) struct Inner<C: Connector> {
    config: EmitterConfig,
    connector: C,
    link: Mutex<Link<C::Stream>>,
    stats: Arc<StatsCollector>,
}

impl<C: Connector> Inner<C> {
    fn link(&self) -> MutexGuard<'_, Link<C::Stream>> {
        // Link is never left half-updated by a panic, so poisoning is ignored.
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dropped(&self, reason: DropReason, metric: &str) {
        dropped::record(&self.stats, self.config.on_drop.as_ref(), reason, metric);
    }
}

/// Best-effort metric emitter sharing one collector connection.
///
/// An `Emitter` is meant to be constructed once at program start and handed
/// to every call site that records metrics. Cloning is cheap and all clones
/// share the same connection, throttle and counters.
///
/// # Delivery
///
/// [`log`](Emitter::log) never fails, never panics and never blocks for
/// longer than the configured connect or send timeout. A record is either
/// written in full or dropped. After any failure the connection is discarded
/// and a new one is attempted at most once per reconnect interval.
///
/// # Example
///
/// ```rust,no_run
/// use metric_observer::{Emitter, EmitterConfig, WireFormat};
///
/// let emitter = Emitter::new(
///     EmitterConfig::default()
///         .port(7777)
///         .format(WireFormat::Delimited),
/// )?;
///
/// emitter.log("database_calls", "file", "file.php@L123", Some(0.142857));
/// emitter.count("cache_misses", "table", "users");
/// # Ok::<(), metric_observer::Error>(())
/// ```
pub struct Emitter<C: Connector = TcpConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Emitter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Emitter<TcpConnector> {
    /// Creates an emitter connecting over TCP.
    ///
    /// No connection is made until the first record is logged.
    pub fn new(config: EmitterConfig) -> Result<Self> {
        Self::with_connector(config, TcpConnector::default())
    }
}

impl Default for Emitter<TcpConnector> {
    /// An emitter for `localhost:7777` with the default configuration.
    fn default() -> Self {
        Self::from_parts(EmitterConfig::default(), TcpConnector::default())
    }
}

impl<C: Connector> Emitter<C> {
    /// Creates an emitter that obtains its streams from `connector`.
    pub fn with_connector(config: EmitterConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, connector))
    }

    fn from_parts(config: EmitterConfig, connector: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                link: Mutex::new(Link {
                    stream: None,
                    next_attempt: None,
                    buf: Vec::with_capacity(128),
                }),
                stats: Arc::new(StatsCollector::new()),
            }),
        }
    }

    /// Records one observation.
    ///
    /// `duration` is in seconds; `None` records a count/event observation and
    /// produces no duration field on the wire.
    pub fn log(&self, metric: &str, tag_name: &str, tag_value: &str, duration: Option<f64>) {
        self.emit(&Record::new(metric, tag_name, tag_value, duration));
    }

    /// Records a count/event observation.
    pub fn count(&self, metric: &str, tag_name: &str, tag_value: &str) {
        self.log(metric, tag_name, tag_value, None);
    }

    /// Records a timing observation.
    pub fn timing(&self, metric: &str, tag_name: &str, tag_value: &str, elapsed: Duration) {
        self.log(metric, tag_name, tag_value, Some(elapsed.as_secs_f64()));
    }

    /// Runs `f` and records how long it took.
    pub fn time<T>(
        &self,
        metric: &str,
        tag_name: &str,
        tag_value: &str,
        f: impl FnOnce() -> T,
    ) -> T {
        let start = Instant::now();
        let result = f();
        self.timing(metric, tag_name, tag_value, start.elapsed());
        result
    }

    pub(crate) fn emit(&self, record: &Record<'_>) {
        let outcome = {
            let mut link = self.inner.link();
            self.deliver(&mut link, record)
        };

        if let Err(reason) = outcome {
            self.inner.dropped(reason, record.metric);
        }
    }

    fn deliver(
        &self,
        link: &mut Link<C::Stream>,
        record: &Record<'_>,
    ) -> std::result::Result<(), DropReason> {
        let inner = &*self.inner;
        link.ensure_connected(&inner.connector, &inner.config, &inner.stats)?;

        link.buf.clear();
        inner.config.format.encode(record, &mut link.buf)?;

        link.write_record(&inner.stats)
    }

    /// The configuration this emitter was built with.
    pub fn config(&self) -> &EmitterConfig {
        &self.inner.config
    }

    pub(crate) fn stats_collector(&self) -> &Arc<StatsCollector> {
        &self.inner.stats
    }

    /// Current connection state. Never triggers a connect attempt.
    pub fn state(&self) -> ConnectionState {
        let link = self.inner.link();
        if link.stream.is_some() {
            ConnectionState::Connected
        } else if link.gate_open(Instant::now()) {
            ConnectionState::Unconnected
        } else {
            ConnectionState::Connecting
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Drops the current connection, if any. The throttle is left untouched.
    pub fn disconnect(&self) {
        if self.inner.link().stream.take().is_some() {
            log::debug!("Metric collector connection closed on request");
        }
    }

    /// Snapshot of the delivery counters shared by all clones.
    pub fn stats(&self) -> EmitterStats {
        self.inner.stats.snapshot()
    }
}

impl<C: Connector> std::fmt::Debug for Emitter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish()
    }
}
