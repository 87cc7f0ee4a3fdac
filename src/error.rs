// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug)]
/// Represents errors that can occur while building an emitter or its worker.
///
/// These errors only appear on construction paths such as
/// [`Emitter::new`](crate::Emitter::new) or [`Worker::spawn`](crate::Worker::spawn).
/// Recording a metric never returns an error; delivery failures are reported
/// through the drop hook and [`EmitterStats`](crate::EmitterStats) instead.
pub enum Error {
    /// A configuration value was rejected by validation
    InvalidConfig {
        /// Name of the offending configuration field
        field: &'static str,
        /// Additional context about the error
        details: String,
    },
    /// Error related to worker mailbox capacity configuration
    MailboxCapacity {
        /// Detailed error message describing the mailbox capacity issue
        message: String,
    },
    /// Error when the worker thread could not be started
    Spawn {
        /// Underlying operating system error
        source: std::io::Error,
    },
}

/// Implementation of the Display trait for Error enum.
///
/// Provides human-readable error messages for each error variant.
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidConfig { field, details } => {
                write!(f, "Invalid emitter configuration for '{field}': {details}")
            }
            Error::MailboxCapacity { message } => {
                write!(f, "Mailbox capacity error: {message}")
            }
            Error::Spawn { source } => {
                write!(f, "Failed to spawn emitter worker thread: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Spawn { source } => Some(source),
            _ => None,
        }
    }
}

/// A Result type specialized for metric-observer construction.
///
/// # Examples
///
/// ```rust
/// use metric_observer::{Emitter, EmitterConfig, Result};
///
/// fn build() -> Result<Emitter> {
///     Emitter::new(EmitterConfig::default().port(7777))
/// }
/// # let _ = build();
/// ```
pub type Result<T> = std::result::Result<T, Error>;
