// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Dropped Record Tracking
//!
//! Every failure inside the emitter collapses into the same outcome: the record
//! is dropped and the caller carries on. This module is the single place where
//! that outcome is made observable.
//!
//! # Background
//!
//! A record is dropped when:
//! - The collector address produced no usable socket
//! - The connect attempt was refused, timed out, or the host was unreachable
//! - The write failed or could not complete within the send timeout
//! - A reconnect was not allowed yet because the throttle window is still open
//! - The record could not be encoded in the configured wire format
//! - The worker mailbox was full or the worker had already stopped
//!
//! # Observability
//!
//! Drops are never returned to the caller of [`Emitter::log`](crate::Emitter::log).
//! They are visible through three side channels:
//!
//! 1. The `dropped` counter in [`EmitterStats`](crate::EmitterStats).
//! 2. An optional [`DropHook`] installed with
//!    [`EmitterConfig::on_drop`](crate::EmitterConfig::on_drop).
//! 3. A `trace`-level log line (and a structured `tracing` event when the
//!    `tracing` feature is enabled):
//!
//! ```text
//! TRACE metric_observer::dropped: Dropped metric record
//!   drop.metric="database_calls"
//!   drop.reason="connect failed"
//! ```
//!
//! # Performance Characteristics
//!
//! | Scenario | Overhead |
//! |----------|----------|
//! | Successful write (hot path) | **Zero** - no code executes |
//! | Drop, no hook, trace disabled | one relaxed atomic add + level check |
//! | Drop, hook installed | whatever the hook costs |
//!
//! The hook runs after the connection lock has been released, so it may call
//! back into the emitter without deadlocking.

use std::sync::Arc;

use crate::stats::StatsCollector;

/// Callback invoked once for every dropped record.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
/// use metric_observer::{DropReason, EmitterConfig};
///
/// let drops = Arc::new(AtomicU64::new(0));
/// let counter = drops.clone();
/// let config = EmitterConfig::default().on_drop(move |_reason: DropReason| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
/// # let _ = config;
/// ```
pub type DropHook = Arc<dyn Fn(DropReason) + Send + Sync>;

/// Reason why a metric record was dropped.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking existing code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DropReason {
    /// No socket could be created for the collector address.
    ///
    /// Covers name resolution failures, addresses that resolve to nothing,
    /// and sockets that could not be configured with the send timeout.
    SocketCreate,

    /// The connect attempt failed (refused, timed out, or unreachable).
    Connect,

    /// Writing the record failed: reset, broken pipe, send timeout, or a short write.
    ///
    /// The connection is discarded and the next call starts from scratch.
    Write,

    /// No connection was available and the reconnect throttle was still closed.
    Throttled,

    /// The record could not be represented in the configured wire format.
    Encode,

    /// The worker mailbox was full.
    MailboxFull,

    /// The worker has stopped and no longer accepts records.
    WorkerStopped,
}

impl DropReason {
    /// Short, stable label for this reason, suitable for metric tags.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DropReason::SocketCreate => "socket create failed",
            DropReason::Connect => "connect failed",
            DropReason::Write => "write failed",
            DropReason::Throttled => "throttled",
            DropReason::Encode => "encode failed",
            DropReason::MailboxFull => "mailbox full",
            DropReason::WorkerStopped => "worker stopped",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for DropReason {}

/// Records a dropped metric record.
///
/// Increments the shared drop counter, emits a trace-level log line and
/// finally invokes the user hook, if any. Must be called without holding the
/// connection lock.
#[cold]
pub(crate) fn record(
    stats: &StatsCollector,
    hook: Option<&DropHook>,
    reason: DropReason,
    metric: &str,
) {
    stats.record_drop();

    log::trace!("Dropped metric record '{}': {}", metric, reason);

    #[cfg(feature = "tracing")]
    tracing::trace!(
        drop.metric = metric,
        drop.reason = %reason,
        "Dropped metric record"
    );

    if let Some(hook) = hook {
        hook(reason);
    }
}
