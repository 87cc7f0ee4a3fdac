// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Transport seam between the emitter state machine and the socket layer.
//!
//! The [`Emitter`](crate::Emitter) never opens sockets itself. It asks a
//! [`Connector`] for a fresh stream whenever the throttle allows a connect
//! attempt and throws the stream away on the first failed write.
//! [`TcpConnector`] is the production implementation; tests and embedders
//! may provide their own.

use std::fmt;
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use crate::{DropReason, EmitterConfig};

/// Why a connect attempt produced no stream.
#[derive(Debug)]
pub enum ConnectError {
    /// No socket could be created: resolution failed or the socket rejected its options.
    SocketCreate(io::Error),
    /// The dialled address refused, timed out, or was unreachable.
    Connect(io::Error),
}

impl ConnectError {
    /// The drop reason a record is tagged with when this error prevented delivery.
    pub fn reason(&self) -> DropReason {
        match self {
            ConnectError::SocketCreate(_) => DropReason::SocketCreate,
            ConnectError::Connect(_) => DropReason::Connect,
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::SocketCreate(e) => write!(f, "socket create failed: {e}"),
            ConnectError::Connect(e) => write!(f, "connect failed: {e}"),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectError::SocketCreate(e) | ConnectError::Connect(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConnectError {
    fn from(error: io::Error) -> Self {
        ConnectError::Connect(error)
    }
}

/// Opens streams to the collector.
///
/// Implementations must honour the timeouts in the passed configuration: a
/// call to [`connect`](Connector::connect) is expected to return within the
/// effective connect timeout and the returned stream's writes within the send
/// timeout.
pub trait Connector: Send + Sync + 'static {
    /// The stream type produced by this connector.
    type Stream: Write + Send + 'static;

    fn connect(&self, config: &EmitterConfig) -> Result<Self::Stream, ConnectError>;
}

/// Connects to the collector over TCP using the standard library socket.
///
/// The collector address is resolved once and cached. Host names are looked
/// up on a helper thread so that a slow resolver costs a connect attempt at
/// most its connect timeout; an unfinished lookup is picked up again by the
/// next attempt. Each attempt dials exactly one cached address and moves on
/// to the next one only after a failure. Once every cached address has
/// failed in a row the cache is discarded and the name resolved again.
#[derive(Debug, Default)]
pub struct TcpConnector {
    resolver: Mutex<Resolver>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolver(&self) -> MutexGuard<'_, Resolver> {
        self.resolver.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, config: &EmitterConfig) -> Result<TcpStream, ConnectError> {
        let deadline = config
            .effective_connect_timeout()
            .map(|timeout| Instant::now() + timeout);

        let mut resolver = self.resolver();
        let addr = resolver
            .next_addr(config.get_address(), config.get_port(), deadline)
            .map_err(ConnectError::SocketCreate)?;

        let attempt = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ConnectError::Connect(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "connect timeout spent resolving the collector address",
                    )));
                }
                TcpStream::connect_timeout(&addr, remaining)
            }
            None => TcpStream::connect(addr),
        };

        match attempt {
            Ok(stream) => {
                resolver.connected();
                stream
                    .set_write_timeout(config.get_send_timeout())
                    .map_err(ConnectError::SocketCreate)?;
                Ok(stream)
            }
            Err(e) => {
                log::trace!("Connect to {} failed: {}", addr, e);
                resolver.failed();
                Err(ConnectError::Connect(e))
            }
        }
    }
}

type Lookup = mpsc::Receiver<io::Result<Vec<SocketAddr>>>;

/// Cached addresses for one `address:port` target.
#[derive(Debug, Default)]
struct Resolver {
    target: Option<(String, u16)>,
    addrs: Vec<SocketAddr>,
    next: usize,
    failures: usize,
    pending: Option<Lookup>,
}

impl Resolver {
    /// The address the next connect attempt should dial.
    ///
    /// Waits for an outstanding lookup until `deadline` at most.
    fn next_addr(
        &mut self,
        host: &str,
        port: u16,
        deadline: Option<Instant>,
    ) -> io::Result<SocketAddr> {
        let same_target = self
            .target
            .as_ref()
            .is_some_and(|(h, p)| h == host && *p == port);
        if !same_target {
            *self = Resolver {
                target: Some((host.to_owned(), port)),
                ..Resolver::default()
            };
        }

        if self.addrs.is_empty() {
            self.addrs = self.resolve(host, port, deadline)?;
            self.next = 0;
            self.failures = 0;
        }
        Ok(self.addrs[self.next % self.addrs.len()])
    }

    fn resolve(
        &mut self,
        host: &str,
        port: u16,
        deadline: Option<Instant>,
    ) -> io::Result<Vec<SocketAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let lookup = match self.pending.take() {
            Some(lookup) => lookup,
            None => spawn_lookup(host, port)?,
        };
        let outcome = match deadline {
            Some(deadline) => {
                lookup.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => lookup.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match outcome {
            Ok(Ok(addrs)) if addrs.is_empty() => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{host} resolved to no addresses"),
            )),
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.pending = Some(lookup);
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("lookup of {host} still in progress"),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::other(format!(
                "lookup of {host} exited without an answer"
            ))),
        }
    }

    fn connected(&mut self) {
        self.failures = 0;
    }

    fn failed(&mut self) {
        self.failures += 1;
        if self.failures >= self.addrs.len() {
            self.addrs.clear();
        } else {
            self.next = (self.next + 1) % self.addrs.len();
        }
    }
}

fn spawn_lookup(host: &str, port: u16) -> io::Result<Lookup> {
    let (sender, receiver) = mpsc::channel();
    let host = host.to_owned();
    thread::Builder::new()
        .name("metric-observer-resolve".to_string())
        .spawn(move || {
            let result = (host.as_str(), port)
                .to_socket_addrs()
                .map(Iterator::collect);
            // The connector may have given up on this lookup already.
            let _ = sender.send(result);
        })?;
    Ok(receiver)
}
