// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Writes one timing record every 100 ms to a collector on `localhost:7777`.
//!
//! ```bash
//! RUST_LOG=metric_observer=debug cargo run --example writer
//! ```
//!
//! Start and stop the collector while this runs to watch the emitter drop
//! records and reconnect on its own.

use std::time::Duration;

use anyhow::Result;
use metric_observer::{Emitter, EmitterConfig};

fn main() -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    #[cfg(not(feature = "tracing"))]
    env_logger::init();

    let emitter = Emitter::new(EmitterConfig::default().address("localhost").port(7777))?;

    loop {
        emitter.log("database_calls", "file", "file.php@L123", Some(1.0 / 7.0));
        std::thread::sleep(Duration::from_millis(100));
    }
}
