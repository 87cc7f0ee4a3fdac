// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::{DropHook, DropReason, WireFormat};

/// Default collector host.
pub const DEFAULT_ADDRESS: &str = "localhost";
/// Default collector port.
pub const DEFAULT_PORT: u16 = 7777;
/// Default bound on a single write to the collector.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(1);
/// Default minimum interval between two connect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for an [`Emitter`](crate::Emitter).
///
/// Built with chained setters on top of [`Default`]:
///
/// ```rust
/// use std::time::Duration;
/// use metric_observer::{EmitterConfig, WireFormat};
///
/// let config = EmitterConfig::default()
///     .address("127.0.0.1")
///     .port(7777)
///     .send_timeout(Duration::from_millis(5))
///     .format(WireFormat::Delimited);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct EmitterConfig {
    pub(crate) address: String,
    pub(crate) port: u16,
    pub(crate) send_timeout: Option<Duration>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) reconnect_interval: Duration,
    pub(crate) format: WireFormat,
    pub(crate) on_drop: Option<DropHook>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
            connect_timeout: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            format: WireFormat::default(),
            on_drop: None,
        }
    }
}

impl EmitterConfig {
    /// Host name or IP literal of the collector.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Upper bound on a single record write. A write that cannot complete in
    /// time is treated as a failed connection.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Removes the send timeout; writes may then block until the kernel gives up.
    pub fn unbounded_send(mut self) -> Self {
        self.send_timeout = None;
        self
    }

    /// Upper bound on a connect attempt. Defaults to the send timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Minimum time between two connect attempts.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Installs a callback invoked once per dropped record.
    pub fn on_drop<F>(mut self, hook: F) -> Self
    where
        F: Fn(DropReason) + Send + Sync + 'static,
    {
        self.on_drop = Some(Arc::new(hook));
        self
    }

    pub fn get_address(&self) -> &str {
        &self.address
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    /// Connect bound actually applied: the explicit connect timeout, else the
    /// send timeout, else none.
    pub fn effective_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.or(self.send_timeout)
    }

    pub fn get_reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    pub fn get_format(&self) -> WireFormat {
        self.format
    }

    /// Checks the configuration for values the socket layer would reject.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(invalid("address", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must not be zero"));
        }
        if self.send_timeout == Some(Duration::ZERO) {
            return Err(invalid(
                "send_timeout",
                "must be greater than zero; use unbounded_send() to disable it",
            ));
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(invalid("connect_timeout", "must be greater than zero"));
        }
        if self.reconnect_interval.is_zero() {
            return Err(invalid("reconnect_interval", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, details: &str) -> Error {
    Error::InvalidConfig {
        field,
        details: details.to_string(),
    }
}

impl fmt::Debug for EmitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("send_timeout", &self.send_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("format", &self.format)
            .field("on_drop", &self.on_drop.as_ref().map(|_| "<hook>"))
            .finish()
    }
}
