// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Emitter Delivery Statistics
//!
//! Every emitter keeps a small set of lock-free counters describing what
//! happened to the records handed to it. They are the side channel for
//! observing loss without changing the fire-and-forget contract of
//! [`Emitter::log`](crate::Emitter::log).
//!
//! # Counters
//!
//! - **sent**: records fully written to the collector socket
//! - **bytes_sent**: wire bytes of those records, terminator included
//! - **dropped**: records discarded for any [`DropReason`](crate::DropReason)
//! - **connect_attempts**: connect syscalls issued (bounded by the throttle)
//! - **connects**: attempts that produced a live connection
//! - **write_failures**: writes that tore down a live connection
//!
//! # Example
//!
//! ```rust,ignore
//! let emitter = Emitter::default();
//! emitter.log("database_calls", "file", "file.php@L123", Some(0.142857));
//!
//! let stats = emitter.stats();
//! println!("sent {} dropped {}", stats.sent, stats.dropped);
//! ```

pub(crate) mod collector;
mod snapshot;

pub(crate) use collector::StatsCollector;
pub use snapshot::EmitterStats;
