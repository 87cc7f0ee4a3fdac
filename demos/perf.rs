// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Measures the caller-side cost of `Emitter::log`.
//!
//! ```bash
//! cargo run --release --example perf
//! ```
//!
//! Runs one million calls against a closed port (7778), one million against
//! an open port (7777, start a collector first), and one million plain `%g`
//! formats for comparison.

use std::time::{Duration, Instant};

use anyhow::Result;
use metric_observer::{Emitter, EmitterConfig, General, WireFormat};

const CALLS: usize = 1_000_000;

fn bench(label: &str, mut f: impl FnMut()) {
    println!("{label}");
    let start = Instant::now();
    for _ in 0..CALLS {
        f();
    }
    let elapsed = start.elapsed();
    println!(
        "{:.3} s total, {:.0} ns per call",
        elapsed.as_secs_f64(),
        elapsed.as_nanos() as f64 / CALLS as f64
    );
}

fn main() -> Result<()> {
    env_logger::init();

    let closed = Emitter::new(
        EmitterConfig::default()
            .port(7778)
            .format(WireFormat::Delimited),
    )?;
    bench("Emitter::log() to a closed port", || {
        closed.log("database_calls", "file", "file.php@L123", Some(0.142857));
    });
    println!("{:?}\n", closed.stats());

    std::thread::sleep(Duration::from_secs(2));

    let open = Emitter::new(
        EmitterConfig::default()
            .port(7777)
            .format(WireFormat::Delimited),
    )?;
    bench("Emitter::log() to an open port", || {
        open.log("database_calls", "file", "file.php@L123", Some(0.142857));
    });
    println!("{:?}\n", open.stats());

    std::thread::sleep(Duration::from_secs(2));

    bench("%g formatting (for comparison)", || {
        std::hint::black_box(General(std::hint::black_box(0.142857)).to_string());
    });

    Ok(())
}
