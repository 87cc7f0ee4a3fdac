// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

//! Connection state machine tests driven through an in-memory connector.

mod common;

use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use common::{init_logger, DropLog, FakeConnector};
use metric_observer::{ConnectionState, DropReason, Emitter, EmitterConfig, WireFormat};

fn emitter(
    connector: &FakeConnector,
    drops: &DropLog,
    interval: Duration,
) -> Emitter<FakeConnector> {
    let config = drops.install(
        EmitterConfig::default()
            .reconnect_interval(interval)
            .format(WireFormat::Delimited),
    );
    Emitter::with_connector(config, connector.clone()).unwrap()
}

#[test]
fn test_one_connect_attempt_per_window_under_load() {
    init_logger();
    let connector = FakeConnector::default();
    connector.set_refuse(true);
    let drops = DropLog::default();
    let emitter = emitter(&connector, &drops, Duration::from_secs(3600));

    for _ in 0..1_000_000 {
        emitter.log("database_calls", "file", "file.php@L123", Some(0.142857));
    }

    assert_eq!(connector.attempts(), 1);
    let stats = emitter.stats();
    assert_eq!(stats.connect_attempts, 1);
    assert_eq!(stats.dropped, 1_000_000);
    assert_eq!(drops.count(DropReason::Connect), 1);
    assert_eq!(drops.count(DropReason::Throttled), 999_999);
}

#[test]
fn test_attempts_resume_after_window() {
    let connector = FakeConnector::default();
    connector.set_refuse(true);
    let drops = DropLog::default();
    let emitter = emitter(&connector, &drops, Duration::from_millis(50));

    emitter.count("m", "t", "v");
    emitter.count("m", "t", "v");
    assert_eq!(connector.attempts(), 1);
    assert_eq!(emitter.state(), ConnectionState::Connecting);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(emitter.state(), ConnectionState::Unconnected);

    connector.set_refuse(false);
    emitter.count("m", "t", "v");
    assert_eq!(connector.attempts(), 2);
    assert_eq!(emitter.state(), ConnectionState::Connected);
    assert_eq!(connector.lines(0), vec!["m:t:v"]);
}

#[test]
fn test_write_failure_reconnects_on_fresh_stream() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let emitter = emitter(&connector, &drops, Duration::from_millis(50));

    emitter.count("before", "t", "v");
    assert_eq!(connector.attempts(), 1);

    thread::sleep(Duration::from_millis(60));
    connector.set_break_writes(true);
    emitter.count("broken", "t", "v");
    assert_eq!(emitter.state(), ConnectionState::Unconnected);
    assert_eq!(drops.reasons(), vec![DropReason::Write]);

    connector.set_break_writes(false);
    emitter.count("after", "t", "v");

    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.stream_count(), 2);
    assert_eq!(connector.lines(0), vec!["before:t:v".to_string()]);
    assert_eq!(connector.lines(1), vec!["after:t:v".to_string()]);
    let stats = emitter.stats();
    assert_eq!(stats.write_failures, 1);
    assert_eq!(stats.connects, 2);
}

#[test]
fn test_write_failure_inside_window_is_throttled() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let emitter = emitter(&connector, &drops, Duration::from_secs(3600));

    emitter.count("ok", "t", "v");
    connector.set_break_writes(true);
    emitter.count("broken", "t", "v");
    connector.set_break_writes(false);
    emitter.count("throttled", "t", "v");

    assert_eq!(connector.attempts(), 1);
    assert_eq!(
        drops.reasons(),
        vec![DropReason::Write, DropReason::Throttled]
    );
    assert_eq!(emitter.state(), ConnectionState::Connecting);
}

#[test]
fn test_encode_failure_keeps_connection() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let config = drops.install(EmitterConfig::default().format(WireFormat::KeyValue));
    let emitter = Emitter::with_connector(config, connector.clone()).unwrap();

    emitter.log("m", "t", "v", Some(f64::INFINITY));
    emitter.log("m", "t", "v", Some(1.5));

    assert_eq!(drops.reasons(), vec![DropReason::Encode]);
    assert!(emitter.is_connected());
    assert_eq!(
        connector.lines(0),
        vec!["{\"k\":[\"m\",\"t\",\"v\"],\"v\":1.5}".to_string()]
    );
}

#[test]
fn test_concurrent_records_never_interleave() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let emitter = emitter(&connector, &drops, Duration::from_secs(3600));

    let threads: Vec<_> = (0..8)
        .map(|worker| {
            let emitter = emitter.clone();
            thread::spawn(move || {
                let tag = format!("thread-{worker}");
                for i in 0..1000 {
                    emitter.log("concurrent", &tag, &i.to_string(), Some(0.25));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let lines = connector.all_lines();
    assert_eq!(lines.len(), 8000);
    for line in &lines {
        let fields: Vec<&str> = line.split(':').collect();
        assert_eq!(fields.len(), 4, "malformed record: {line}");
        assert_eq!(fields[0], "concurrent");
        assert!(fields[1].starts_with("thread-"));
        assert_eq!(fields[3], "0.25");
    }
    assert_eq!(connector.attempts(), 1);
    assert!(drops.reasons().is_empty());
}

#[test]
fn test_hook_may_log_again_without_deadlock() {
    let connector = FakeConnector::default();
    connector.set_refuse(true);
    let slot: Arc<OnceLock<Emitter<FakeConnector>>> = Arc::new(OnceLock::new());
    let hook_slot = slot.clone();
    let config = EmitterConfig::default()
        .reconnect_interval(Duration::from_secs(3600))
        .on_drop(move |reason| {
            if reason == DropReason::Connect {
                if let Some(emitter) = hook_slot.get() {
                    emitter.count("metric_drops", "reason", reason.as_str());
                }
            }
        });
    let emitter = Emitter::with_connector(config, connector.clone()).unwrap();
    let _ = slot.set(emitter.clone());

    emitter.count("m", "t", "v");

    // The connect drop plus the throttled record logged from inside the hook.
    assert_eq!(emitter.stats().dropped, 2);
}
