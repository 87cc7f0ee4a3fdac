// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Wire formats for metric records.
//!
//! Each record is a single line terminated by `\n`. Three line formats are
//! supported; an emitter uses exactly one of them for its whole lifetime, and
//! they are not wire-compatible with each other.
//!
//! | Format | Version | With duration | Without duration |
//! |--------|---------|---------------|------------------|
//! | [`WireFormat::Delimited`] | `delimited/v1` | `m:t:v:0.142857` | `m:t:v` |
//! | [`WireFormat::KeyValue`] | `kv-json/v1` | `{"k":["m","t","v"],"v":0.142857}` | `{"k":["m","t","v"]}` |
//! | [`WireFormat::Array`] | `array-json/v1` | `["m","t","v","0.142857"]` | `["m","t","v"]` |
//!
//! Durations in the text based forms use the C `%g` convention, see [`General`].

use std::fmt::{self, Write as _};
use std::io::Write;

use serde::{Serialize, Serializer};

use crate::DropReason;

/// Significant digits used by [`General`].
const PRECISION: usize = 6;

/// Line format used to encode records on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum WireFormat {
    /// Colon separated text: `metric:tag_name:tag_value[:duration]`.
    ///
    /// Field values are written verbatim; values containing `:` or `\n`
    /// produce records the collector cannot split correctly.
    Delimited,
    /// JSON object `{"k":[metric,tag_name,tag_value],"v":duration}` with a numeric duration.
    KeyValue,
    /// JSON array `[metric,tag_name,tag_value,"duration"]` with the duration as a string.
    #[default]
    Array,
}

impl WireFormat {
    /// Stable identifier of the schema, including its version.
    pub const fn version(&self) -> &'static str {
        match self {
            WireFormat::Delimited => "delimited/v1",
            WireFormat::KeyValue => "kv-json/v1",
            WireFormat::Array => "array-json/v1",
        }
    }

    /// Appends one encoded record, newline included, to `buf`.
    ///
    /// On error `buf` may hold a partial record and must be discarded.
    pub fn encode(&self, record: &Record<'_>, buf: &mut Vec<u8>) -> Result<(), DropReason> {
        match self {
            WireFormat::Delimited => {
                write!(
                    buf,
                    "{}:{}:{}",
                    record.metric, record.tag_name, record.tag_value
                )
                .map_err(|_| DropReason::Encode)?;
                if let Some(duration) = record.duration {
                    write!(buf, ":{}", General(duration)).map_err(|_| DropReason::Encode)?;
                }
            }
            WireFormat::KeyValue => {
                // serde_json would silently turn these into `null`.
                if record.duration.is_some_and(|d| !d.is_finite()) {
                    return Err(DropReason::Encode);
                }
                let line = KeyValueLine {
                    k: [record.metric, record.tag_name, record.tag_value],
                    v: record.duration,
                };
                serde_json::to_writer(&mut *buf, &line).map_err(|_| DropReason::Encode)?;
            }
            WireFormat::Array => {
                let fields = (record.metric, record.tag_name, record.tag_value);
                let written = match record.duration {
                    None => serde_json::to_writer(&mut *buf, &fields),
                    Some(duration) => {
                        let (metric, tag_name, tag_value) = fields;
                        serde_json::to_writer(
                            &mut *buf,
                            &(metric, tag_name, tag_value, General(duration)),
                        )
                    }
                };
                written.map_err(|_| DropReason::Encode)?;
            }
        }
        buf.push(b'\n');
        Ok(())
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}

#[derive(Serialize)]
struct KeyValueLine<'a> {
    k: [&'a str; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    v: Option<f64>,
}

/// One metric observation, borrowed from the caller for the duration of a `log` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record<'a> {
    pub metric: &'a str,
    pub tag_name: &'a str,
    pub tag_value: &'a str,
    /// Seconds; `None` marks a count/event observation.
    pub duration: Option<f64>,
}

impl<'a> Record<'a> {
    pub fn new(
        metric: &'a str,
        tag_name: &'a str,
        tag_value: &'a str,
        duration: Option<f64>,
    ) -> Self {
        Self {
            metric,
            tag_name,
            tag_value,
            duration,
        }
    }
}

/// Formats a float like C's `%g`: six significant digits, trailing zeros
/// removed, exponent notation when the decimal exponent is below -4 or at
/// least 6.
///
/// ```rust
/// use metric_observer::General;
///
/// assert_eq!(General(1.0 / 7.0).to_string(), "0.142857");
/// assert_eq!(General(0.00001).to_string(), "1e-05");
/// assert_eq!(General(2_500_000.0).to_string(), "2.5e+06");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct General(pub f64);

impl fmt::Display for General {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        if value.is_nan() {
            return f.write_str("NaN");
        }
        if value.is_infinite() {
            return f.write_str(if value > 0.0 { "+Inf" } else { "-Inf" });
        }
        if value == 0.0 {
            return f.write_str(if value.is_sign_negative() { "-0" } else { "0" });
        }

        // The exponent must be taken after rounding to PRECISION digits.
        let mut scientific = Scratch::new();
        write!(scientific, "{:.*e}", PRECISION - 1, value)?;
        let (mantissa, exponent) = scientific.as_str()?.split_once('e').ok_or(fmt::Error)?;
        let exponent: i32 = exponent.parse().map_err(|_| fmt::Error)?;

        if exponent < -4 || exponent >= PRECISION as i32 {
            let sign = if exponent < 0 { '-' } else { '+' };
            write!(
                f,
                "{}e{}{:02}",
                trim_fraction(mantissa),
                sign,
                exponent.unsigned_abs()
            )
        } else {
            let decimals = (PRECISION as i32 - 1 - exponent) as usize;
            let mut fixed = Scratch::new();
            write!(fixed, "{:.*}", decimals, value)?;
            f.write_str(trim_fraction(fixed.as_str()?))
        }
    }
}

/// Serializes as the `%g` text, a JSON string in `serde_json`.
impl Serialize for General {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Stack buffer holding one formatted number.
struct Scratch {
    bytes: [u8; 32],
    len: usize,
}

impl Scratch {
    fn new() -> Self {
        Self {
            bytes: [0; 32],
            len: 0,
        }
    }

    fn as_str(&self) -> Result<&str, fmt::Error> {
        std::str::from_utf8(&self.bytes[..self.len]).map_err(|_| fmt::Error)
    }
}

impl fmt::Write for Scratch {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        self.bytes
            .get_mut(self.len..end)
            .ok_or(fmt::Error)?
            .copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}
