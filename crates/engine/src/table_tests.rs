// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process table tests

use super::*;
use pmon_core::{CheckConfig, MonitorConfig};

fn monitor(proc: &str) -> MonitorConfig {
    MonitorConfig {
        proc: proc.to_string(),
        ..Default::default()
    }
}

#[test]
fn register_inserts_with_auto_restart() {
    let table = ProcessTable::new();
    let record = table
        .register_or_update(&monitor("/bin/server -p 80"), "./logs")
        .unwrap();

    assert_eq!(record.command_line, "/bin/server -p 80");
    assert_eq!(record.program, "/bin/server");
    assert_eq!(record.args, vec!["-p", "80"]);
    assert!(record.state().auto_restart);
    assert!(!record.is_running());
    assert_eq!(table.len(), 1);
}

#[test]
fn update_refreshes_config_in_place() {
    let table = ProcessTable::new();
    let first = table
        .register_or_update(&monitor("/bin/server"), "./logs")
        .unwrap();

    // Simulate runtime state an operator set up.
    first.set_auto_restart(false);

    let mut cfg = monitor("/bin/server");
    cfg.env = vec!["MODE=canary".to_string()];
    cfg.check = CheckConfig {
        addr: "127.0.0.1:80".to_string(),
        period: 5,
        timeout: 1,
    };
    let second = table.register_or_update(&cfg, "./logs").unwrap();

    // Same record object: the guard and runtime flags survived.
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!second.state().auto_restart);
    assert_eq!(second.state().env, vec!["MODE=canary".to_string()]);
    assert_eq!(second.state().check.addr, "127.0.0.1:80");
}

#[test]
fn blank_proc_entries_are_skipped() {
    let table = ProcessTable::new();
    assert!(table.register_or_update(&monitor("   "), "./logs").is_none());
    assert!(table.is_empty());
}

#[test]
fn prefix_lookup_matches_command_line_prefix() {
    let table = ProcessTable::new();
    table.register_or_update(&monitor("/bin/server -p 80"), "./logs");
    table.register_or_update(&monitor("/bin/server -p 81"), "./logs");
    table.register_or_update(&monitor("/bin/other"), "./logs");

    let hits = table.lookup_by_prefix("/bin/server");
    assert_eq!(hits.len(), 2);
    // Sorted by key, so the result order is deterministic.
    assert_eq!(hits[0].command_line, "/bin/server -p 80");
    assert_eq!(hits[1].command_line, "/bin/server -p 81");

    assert!(table.lookup_by_prefix("/bin/missing").is_empty());
    assert_eq!(table.lookup_by_prefix("/bin/").len(), 3);
}

#[test]
fn exact_lookup_requires_full_key() {
    let table = ProcessTable::new();
    table.register_or_update(&monitor("/bin/server -p 80"), "./logs");

    assert!(table.lookup_exact("/bin/server -p 80").is_some());
    assert!(table.lookup_exact("/bin/server").is_none());
}

#[test]
fn rebuild_removes_vanished_entries() {
    let table = ProcessTable::new();
    table.register_or_update(&monitor("/bin/keep"), "./logs");
    table.register_or_update(&monitor("/bin/drop"), "./logs");

    let removed = table.rebuild(&[monitor("/bin/keep"), monitor("/bin/new")], "./logs");

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].command_line, "/bin/drop");
    assert_eq!(table.len(), 2);
    assert!(table.lookup_exact("/bin/keep").is_some());
    assert!(table.lookup_exact("/bin/new").is_some());
    assert!(table.lookup_exact("/bin/drop").is_none());
}

#[test]
fn snapshot_is_sorted_and_detached() {
    let table = ProcessTable::new();
    table.register_or_update(&monitor("/bin/b"), "./logs");
    table.register_or_update(&monitor("/bin/a"), "./logs");

    let snap = table.snapshot();
    assert_eq!(snap.len(), 2);
    assert_eq!(snap[0].command_line, "/bin/a");
    assert_eq!(snap[1].command_line, "/bin/b");
}
