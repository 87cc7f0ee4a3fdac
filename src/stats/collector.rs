// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use super::EmitterStats;

/// Per-emitter counters using lock-free atomic operations.
///
/// All operations use `Ordering::Relaxed`; the counters are for monitoring,
/// not for synchronizing with the connection state.
#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    dropped: AtomicU64,
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    write_failures: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a record fully written to the socket.
    #[inline]
    pub fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the outcome of one connect attempt.
    #[inline]
    pub fn record_connect(&self, succeeded: bool) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.connects.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EmitterStats {
        EmitterStats {
            sent: self.sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}
