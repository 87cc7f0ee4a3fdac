// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! # metric-observer: Best-Effort Metric Emission
//!
//! `metric-observer` streams metric observations from an application to a
//! local collector process over a single TCP connection. Recording a metric is
//! fire-and-forget: it never returns an error, never panics, and never blocks
//! the caller for longer than a small, configurable timeout. When the
//! collector is down or slow, records are silently dropped and the connection
//! heals itself once the collector is back.
//!
//! ## Features
//!
//! - **Lazy connection**: nothing touches the network until the first record.
//! - **Throttled reconnect**: at most one connect attempt per reconnect
//!   interval (one second by default), whatever the call rate.
//! - **Bounded writes**: every write is limited by a send timeout; an
//!   incomplete write is treated like a reset and the socket is replaced.
//! - **Shared connection**: clones of an [`Emitter`] share one socket, guarded
//!   by a lock so records from different threads never interleave.
//! - **Drop visibility**: an optional [`DropHook`] and [`EmitterStats`]
//!   counters show what was lost without changing the no-error contract.
//! - **Owning worker**: [`Worker`] moves the emitter onto a dedicated thread
//!   behind a bounded mailbox for callers that must not even wait on the lock.
//!
//! ## Core Concepts
//!
//! - **[`Emitter`]**: the client. Construct it once at program start and hand
//!   clones to every call site.
//! - **[`EmitterConfig`]**: collector address, timeouts, reconnect interval,
//!   wire format and drop hook.
//! - **[`WireFormat`]**: the newline-terminated line format, one per emitter.
//! - **[`Connector`]**: the seam that produces streams; [`TcpConnector`] by default.
//! - **[`DropReason`]**: why a record was dropped.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use metric_observer::{Emitter, EmitterConfig, WireFormat};
//!
//! let emitter = Emitter::new(
//!     EmitterConfig::default()
//!         .address("localhost")
//!         .port(7777)
//!         .send_timeout(Duration::from_millis(5))
//!         .format(WireFormat::Delimited)
//!         .on_drop(|reason| eprintln!("metric dropped: {reason}")),
//! )?;
//!
//! // database_calls:file:file.php@L123:0.142857
//! emitter.log("database_calls", "file", "file.php@L123", Some(0.142857));
//!
//! // page_views:route:/home
//! emitter.count("page_views", "route", "/home");
//!
//! let rows = emitter.time("query", "table", "users", || 42);
//! # let _ = rows;
//! # Ok::<(), metric_observer::Error>(())
//! ```
//!
//! ## Logging
//!
//! Connection transitions are logged at `debug` and individual drops at
//! `trace` through the [`log`](https://docs.rs/log) facade. Enable the
//! `tracing` feature to also emit drops as structured `tracing` events.

mod config;
mod dropped;
mod emitter;
mod error;
mod format;
mod stats;
mod transport;
mod worker;

pub use config::{
    EmitterConfig, DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL, DEFAULT_SEND_TIMEOUT,
};
pub use dropped::{DropHook, DropReason};
pub use emitter::{ConnectionState, Emitter};
pub use error::{Error, Result};
pub use format::{General, Record, WireFormat};
pub use stats::EmitterStats;
pub use transport::{ConnectError, Connector, TcpConnector};
pub use worker::{Worker, WorkerHandle};
