// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use metric_observer::{ConnectError, Connector, DropReason, EmitterConfig};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory connector whose behaviour can be flipped between calls.
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub attempts: Arc<AtomicUsize>,
    pub refuse: Arc<AtomicBool>,
    pub break_writes: Arc<AtomicBool>,
    pub write_delay: Arc<Mutex<Option<Duration>>>,
    /// Bytes received per stream, in connect order.
    pub streams: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn set_break_writes(&self, broken: bool) {
        self.break_writes.store(broken, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    /// Lines received on stream `index`.
    pub fn lines(&self, index: usize) -> Vec<String> {
        let streams = self.streams.lock().unwrap();
        String::from_utf8(streams[index].clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Lines received on all streams.
    pub fn all_lines(&self) -> Vec<String> {
        let count = self.streams.lock().unwrap().len();
        (0..count).flat_map(|i| self.lines(i)).collect()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

pub struct FakeStream {
    index: usize,
    connector: FakeConnector,
}

impl Write for FakeStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(delay) = *self.connector.write_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        if self.connector.break_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        }
        self.connector.streams.lock().unwrap()[self.index].extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for FakeConnector {
    type Stream = FakeStream;

    fn connect(&self, _config: &EmitterConfig) -> Result<FakeStream, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::Connect(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let mut streams = self.streams.lock().unwrap();
        streams.push(Vec::new());
        Ok(FakeStream {
            index: streams.len() - 1,
            connector: self.clone(),
        })
    }
}

/// Collects every reason passed to the drop hook.
#[derive(Clone, Default)]
pub struct DropLog(pub Arc<Mutex<Vec<DropReason>>>);

impl DropLog {
    pub fn install(&self, config: EmitterConfig) -> EmitterConfig {
        let sink = self.0.clone();
        config.on_drop(move |reason| sink.lock().unwrap().push(reason))
    }

    pub fn reasons(&self) -> Vec<DropReason> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.0.lock().unwrap().iter().filter(|r| **r == reason).count()
    }
}

/// A loopback collector accepting one connection and returning everything it received.
pub fn spawn_collector() -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).unwrap();
        received
    });
    (port, handle)
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
