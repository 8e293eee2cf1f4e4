// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health checker tests

use super::*;
use crate::trace::BufferTrace;
use pmon_core::{CheckConfig, MonitorConfig};

fn monitor(proc: &str) -> MonitorConfig {
    MonitorConfig {
        proc: proc.to_string(),
        ..Default::default()
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn auto_restart_resolves_stopped_records() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(ProcessTable::new());
    let record = table
        .register_or_update(&monitor("/bin/sleep 30"), &dir.path().display().to_string())
        .unwrap();
    assert!(!record.is_running());

    let checker = Checker::with_interval(
        Arc::clone(&table),
        dir.path().join(".pids"),
        Duration::from_millis(50),
    );
    let task = tokio::spawn(checker.run());

    wait_until("auto-restart", || record.is_running()).await;

    task.abort();
    launcher::kill(&record, 0, &mut BufferTrace::default()).await;
}

#[tokio::test]
async fn stopped_without_auto_restart_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(ProcessTable::new());
    let record = table
        .register_or_update(&monitor("/bin/sleep 30"), &dir.path().display().to_string())
        .unwrap();
    record.set_auto_restart(false);

    let checker = Checker::with_interval(
        Arc::clone(&table),
        dir.path().join(".pids"),
        Duration::from_millis(50),
    );
    let task = tokio::spawn(checker.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!record.is_running());

    task.abort();
}

#[tokio::test]
async fn failed_probe_kills_and_restarts_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(ProcessTable::new());
    let mut cfg = monitor("/bin/sleep 30");
    // Nothing listens on port 1, so the probe fails immediately.
    cfg.check = CheckConfig {
        addr: "127.0.0.1:1".to_string(),
        period: 1,
        timeout: 1,
    };
    let record = table
        .register_or_update(&cfg, &dir.path().display().to_string())
        .unwrap();

    launcher::start(&record, &mut BufferTrace::default()).await;
    let first = record.pid().unwrap();

    let checker = Checker::with_interval(
        Arc::clone(&table),
        dir.path().join(".pids"),
        Duration::from_millis(100),
    );
    let task = tokio::spawn(checker.run());

    // Within a few seconds the probe fires, the child is killed and the
    // restart path brings up a replacement with a different pid.
    wait_until("probe kill and restart", || {
        record.pid().map(|p| p != first).unwrap_or(false)
    })
    .await;

    task.abort();
    launcher::kill(&record, 0, &mut BufferTrace::default()).await;
}

#[tokio::test]
async fn pid_file_lists_supervisor_then_children() {
    let dir = tempfile::tempdir().unwrap();
    let table = Arc::new(ProcessTable::new());
    let record = table
        .register_or_update(&monitor("/bin/sleep 30"), &dir.path().display().to_string())
        .unwrap();

    let pid_path = dir.path().join(".pids");
    let checker = Checker::with_interval(
        Arc::clone(&table),
        pid_path.clone(),
        Duration::from_millis(50),
    );
    let task = tokio::spawn(checker.run());

    wait_until("auto-restart", || record.is_running()).await;
    let child_pid = record.pid().unwrap();
    wait_until("pid file update", || {
        std::fs::read_to_string(&pid_path)
            .map(|s| s.contains(&child_pid.to_string()))
            .unwrap_or(false)
    })
    .await;

    let contents = std::fs::read_to_string(&pid_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], std::process::id().to_string());
    assert!(lines[1..].contains(&child_pid.to_string().as_str()));

    task.abort();
    launcher::kill(&record, 0, &mut BufferTrace::default()).await;
}
