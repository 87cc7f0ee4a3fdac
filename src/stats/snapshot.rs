// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

/// Immutable snapshot of an emitter's delivery counters.
///
/// All fields are cumulative since the emitter was constructed. Clones of an
/// [`Emitter`](crate::Emitter) and any [`WorkerHandle`](crate::WorkerHandle)
/// built from it share the same counters.
///
/// # Consistency Note
///
/// Each field is read atomically, but the snapshot as a whole may mix values
/// from slightly different moments when taken concurrently with logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct EmitterStats {
    /// Records fully written to the collector.
    pub sent: u64,

    /// Bytes written for those records, newline terminators included.
    pub bytes_sent: u64,

    /// Records dropped for any reason.
    pub dropped: u64,

    /// Connect attempts issued.
    ///
    /// Never exceeds one per reconnect interval.
    pub connect_attempts: u64,

    /// Connect attempts that succeeded.
    pub connects: u64,

    /// Writes that failed and discarded a live connection.
    pub write_failures: u64,
}

impl EmitterStats {
    /// Fraction of offered records that were dropped, `0.0` when nothing was offered.
    pub fn drop_ratio(&self) -> f64 {
        let offered = self.sent + self.dropped;
        if offered == 0 {
            0.0
        } else {
            self.dropped as f64 / offered as f64
        }
    }
}
