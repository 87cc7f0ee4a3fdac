// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Single-owner delivery worker.
//!
//! Instead of every caller taking the emitter lock in turn, a [`Worker`]
//! moves the [`Emitter`] onto one dedicated thread and feeds it through a
//! bounded mailbox. Callers only pay for a `try_send`:
//!
//! - a full mailbox drops the record with [`DropReason::MailboxFull`]
//! - a stopped worker drops it with [`DropReason::WorkerStopped`]
//!
//! Neither case blocks, so [`WorkerHandle::log`] is safe to call from async
//! tasks as well as from plain threads.
//!
//! ```rust,no_run
//! use metric_observer::{Emitter, Worker};
//!
//! let (handle, join) = Worker::spawn(Emitter::default(), 1024)?;
//! handle.log("database_calls", "file", "file.php@L123", Some(0.142857));
//!
//! handle.stop();
//! join.join().ok();
//! # Ok::<(), metric_observer::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::dropped;
use crate::error::{Error, Result};
use crate::stats::StatsCollector;
use crate::transport::Connector;
use crate::{DropHook, DropReason, Emitter, EmitterStats, Record};

/// Messages delivered to the worker thread.
#[derive(Debug)]
enum Envelope {
    Record(OwnedRecord),
    /// Close the mailbox; records queued before this one are still delivered.
    Stop,
}

#[derive(Debug)]
struct OwnedRecord {
    metric: String,
    tag_name: String,
    tag_value: String,
    duration: Option<f64>,
}

impl OwnedRecord {
    fn as_record(&self) -> Record<'_> {
        Record::new(&self.metric, &self.tag_name, &self.tag_value, self.duration)
    }
}

/// Spawns the thread that owns an [`Emitter`].
pub struct Worker;

impl Worker {
    /// Moves `emitter` onto a new thread with a mailbox of `capacity` records.
    ///
    /// Returns the handle used to submit records and the thread's join handle.
    /// The thread exits once [`WorkerHandle::stop`] has been called or every
    /// handle has been dropped, after draining the records already queued.
    pub fn spawn<C: Connector>(
        emitter: Emitter<C>,
        capacity: usize,
    ) -> Result<(WorkerHandle, JoinHandle<()>)> {
        if capacity == 0 {
            return Err(Error::MailboxCapacity {
                message: "worker mailbox capacity must be at least 1".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(capacity);
        let stopping = Arc::new(AtomicBool::new(false));

        let handle = WorkerHandle {
            sender,
            stopping: stopping.clone(),
            stats: emitter.stats_collector().clone(),
            on_drop: emitter.config().on_drop.clone(),
        };

        let join = std::thread::Builder::new()
            .name("metric-observer".to_string())
            .spawn(move || run(emitter, receiver, stopping))
            .map_err(|source| Error::Spawn { source })?;

        Ok((handle, join))
    }
}

fn run<C: Connector>(
    emitter: Emitter<C>,
    mut receiver: mpsc::Receiver<Envelope>,
    stopping: Arc<AtomicBool>,
) {
    log::debug!("Metric worker started");

    while let Some(envelope) = receiver.blocking_recv() {
        match envelope {
            Envelope::Record(record) => emitter.emit(&record.as_record()),
            Envelope::Stop => receiver.close(),
        }
        if stopping.load(Ordering::Acquire) {
            receiver.close();
        }
    }

    log::debug!("Metric worker stopped: {:?}", emitter.stats());
}

/// Cloneable, non-blocking submission handle for a [`Worker`].
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::Sender<Envelope>,
    stopping: Arc<AtomicBool>,
    stats: Arc<StatsCollector>,
    on_drop: Option<DropHook>,
}

impl WorkerHandle {
    /// Queues one observation for the worker. Never blocks.
    pub fn log(&self, metric: &str, tag_name: &str, tag_value: &str, duration: Option<f64>) {
        if self.stopping.load(Ordering::Acquire) {
            self.dropped(DropReason::WorkerStopped, metric);
            return;
        }

        let envelope = Envelope::Record(OwnedRecord {
            metric: metric.to_string(),
            tag_name: tag_name.to_string(),
            tag_value: tag_value.to_string(),
            duration,
        });

        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped(DropReason::MailboxFull, metric),
            Err(TrySendError::Closed(_)) => self.dropped(DropReason::WorkerStopped, metric),
        }
    }

    /// Queues a count/event observation.
    pub fn count(&self, metric: &str, tag_name: &str, tag_value: &str) {
        self.log(metric, tag_name, tag_value, None);
    }

    /// Queues a timing observation.
    pub fn timing(&self, metric: &str, tag_name: &str, tag_value: &str, elapsed: Duration) {
        self.log(metric, tag_name, tag_value, Some(elapsed.as_secs_f64()));
    }

    /// Asks the worker to finish. Records already queued are still delivered;
    /// records logged afterwards are dropped. Calling this more than once is harmless.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        // A full mailbox is fine: the worker sees the flag after its next record.
        if self.sender.try_send(Envelope::Stop).is_err() {
            log::debug!("Metric worker mailbox busy, stop will be observed after the next record");
        }
    }

    /// Whether the worker still accepts records.
    pub fn is_alive(&self) -> bool {
        !self.stopping.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Counters of the underlying emitter, including mailbox drops.
    pub fn stats(&self) -> EmitterStats {
        self.stats.snapshot()
    }

    fn dropped(&self, reason: DropReason, metric: &str) {
        dropped::record(&self.stats, self.on_drop.as_ref(), reason, metric);
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("alive", &self.is_alive())
            .field("capacity", &self.sender.max_capacity())
            .finish()
    }
}
