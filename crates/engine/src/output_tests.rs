// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output sink tests

use super::*;

fn sink_at(dir: &std::path::Path, prefix: &str) -> OutputSink {
    OutputSink::new(dir.join("child.out"), prefix)
}

#[test]
fn forwards_writes_to_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = sink_at(dir.path(), "");

    sink.write(b"hello ").unwrap();
    sink.write(b"world\n").unwrap();

    let logged = std::fs::read_to_string(dir.path().join("child.out")).unwrap();
    assert_eq!(logged, "hello world\n");
}

#[test]
fn prefix_at_write_start_enters_capture_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = sink_at(dir.path(), "panic:");

    sink.write(b"ordinary output\n").unwrap();
    assert!(!sink.is_capturing());

    sink.write(b"panic: something broke\n").unwrap();
    assert!(sink.is_capturing());

    // Once capturing, everything after is retained too.
    sink.write(b"stack frame 1\n").unwrap();

    let crash = sink.take_crash();
    assert_eq!(crash, b"panic: something broke\nstack frame 1\n");

    // The log still received all of it.
    let logged = std::fs::read_to_string(dir.path().join("child.out")).unwrap();
    assert!(logged.contains("ordinary output"));
    assert!(logged.contains("stack frame 1"));
}

#[test]
fn prefix_mid_write_does_not_trigger_capture() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = sink_at(dir.path(), "panic:");

    sink.write(b"note: panic: is only a marker at write start\n")
        .unwrap();
    assert!(!sink.is_capturing());
    assert!(sink.take_crash().is_empty());
}

#[test]
fn empty_prefix_never_captures() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = sink_at(dir.path(), "");

    sink.write(b"panic: looks scary\n").unwrap();
    assert!(!sink.is_capturing());
}

#[test]
fn crash_buffer_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = sink_at(dir.path(), "X");

    let chunk = vec![b'X'; 64 * 1024];
    for _ in 0..8 {
        sink.write(&chunk).unwrap();
    }

    let crash = sink.take_crash();
    assert_eq!(crash.len(), CRASH_BUFFER_MAX);
}

#[test]
fn open_failure_is_a_write_error_not_a_panic() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = OutputSink::new(dir.path().join("no-such-dir").join("child.out"), "");

    assert!(sink.write(b"dropped\n").is_err());
    // A later write retries the open.
    assert!(sink.write(b"dropped again\n").is_err());
}

#[test]
fn rotation_shifts_generations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("child.out");
    let mut log = RotatingFile::with_limits(path.clone(), 32, 2);

    log.write_all(&[b'a'; 24]).unwrap();
    log.write_all(&[b'b'; 24]).unwrap(); // exceeds 32, rotates first

    assert!(path.exists());
    assert!(dir.path().join("child.out.1").exists());

    let current = std::fs::read(&path).unwrap();
    assert_eq!(current, vec![b'b'; 24]);
    let rotated = std::fs::read(dir.path().join("child.out.1")).unwrap();
    assert_eq!(rotated, vec![b'a'; 24]);
}
