// Copyright 2022 Jeff Kim <hiking90@gmail.com>
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::time::Duration;

use common::{init_logger, DropLog, FakeConnector};
use metric_observer::{DropReason, Emitter, EmitterConfig, Error, WireFormat, Worker};

fn fake_emitter(connector: &FakeConnector, drops: &DropLog) -> Emitter<FakeConnector> {
    let config = drops.install(EmitterConfig::default().format(WireFormat::Delimited));
    Emitter::with_connector(config, connector.clone()).unwrap()
}

#[test]
fn test_worker_delivers_queued_records_before_stopping() {
    init_logger();
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let (handle, join) = Worker::spawn(fake_emitter(&connector, &drops), 256).unwrap();

    for i in 0..100 {
        handle.log("queued", "index", &i.to_string(), None);
    }
    handle.stop();
    join.join().unwrap();

    let lines = connector.lines(0);
    assert_eq!(lines.len(), 100);
    assert_eq!(lines[0], "queued:index:0");
    assert_eq!(lines[99], "queued:index:99");
    assert_eq!(handle.stats().sent, 100);
    assert!(drops.reasons().is_empty());
}

#[test]
fn test_zero_capacity_rejected() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();

    match Worker::spawn(fake_emitter(&connector, &drops), 0) {
        Err(Error::MailboxCapacity { .. }) => {}
        other => panic!("expected MailboxCapacity error, got {:?}", other.map(|(h, _)| h)),
    }
}

#[test]
fn test_full_mailbox_drops_without_blocking() {
    let connector = FakeConnector::default();
    connector.set_write_delay(Duration::from_millis(200));
    let drops = DropLog::default();
    let (handle, join) = Worker::spawn(fake_emitter(&connector, &drops), 2).unwrap();

    let start = std::time::Instant::now();
    for _ in 0..10 {
        handle.count("burst", "t", "v");
    }
    assert!(start.elapsed() < Duration::from_millis(200));

    handle.stop();
    join.join().unwrap();

    let full = drops.count(DropReason::MailboxFull);
    assert!(full >= 7, "expected at least 7 mailbox drops, got {full}");
    let stats = handle.stats();
    assert_eq!(stats.sent + stats.dropped, 10);
}

#[test]
fn test_records_after_stop_are_dropped() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let (handle, join) = Worker::spawn(fake_emitter(&connector, &drops), 8).unwrap();

    handle.stop();
    handle.stop();
    assert!(!handle.is_alive());
    handle.count("late", "t", "v");
    join.join().unwrap();

    assert_eq!(drops.reasons(), vec![DropReason::WorkerStopped]);
    assert_eq!(connector.attempts(), 0);
}

#[test]
fn test_worker_exits_when_handles_dropped() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let (handle, join) = Worker::spawn(fake_emitter(&connector, &drops), 8).unwrap();

    let clone = handle.clone();
    clone.count("from_clone", "t", "v");
    drop(handle);
    drop(clone);

    join.join().unwrap();
    assert_eq!(connector.lines(0), vec!["from_clone:t:v".to_string()]);
}

#[tokio::test]
async fn test_handle_usable_from_async_tasks() {
    let connector = FakeConnector::default();
    let drops = DropLog::default();
    let (handle, join) = Worker::spawn(fake_emitter(&connector, &drops), 1024).unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|task| {
            let handle = handle.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    handle.timing("async", "task", &task.to_string(), Duration::from_millis(250));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    handle.stop();
    tokio::task::spawn_blocking(move || join.join().unwrap())
        .await
        .unwrap();

    let lines = connector.lines(0);
    assert_eq!(lines.len(), 40);
    assert!(lines.iter().all(|line| line.ends_with(":0.25")));
}
