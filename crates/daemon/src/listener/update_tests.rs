// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update pipeline unit tests for the filesystem pieces.

use super::*;

#[test]
fn staging_and_backup_paths_concatenate() {
    // Absolute targets keep their leading slash under the staging root.
    assert_eq!(
        staging_path("./upload", "/bin/echo"),
        "./upload//bin/echo.new"
    );
    assert_eq!(
        backup_path("./backup", "/bin/echo", "20240102030405"),
        "./backup//bin/echo.20240102030405"
    );
}

#[test]
fn backup_timestamp_is_14_digits() {
    let stamp = backup_timestamp(SystemTime::now());
    assert_eq!(stamp.len(), 14);
    assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
}

#[test]
fn backup_name_matching_requires_exactly_14_digits() {
    assert!(is_backup_of("echo.20240102030405", "echo"));
    assert!(!is_backup_of("echo.2024010203040", "echo")); // 13 digits
    assert!(!is_backup_of("echo.202401020304056", "echo")); // 15 digits
    assert!(!is_backup_of("echo.2024010203040x", "echo")); // non-digit
    assert!(!is_backup_of("echo.new", "echo"));
    assert!(!is_backup_of("other.20240102030405", "echo"));
    assert!(!is_backup_of("echo20240102030405", "echo")); // missing dot
}

#[test]
fn list_backups_sorts_chronologically() {
    let dir = tempfile::tempdir().unwrap();
    let backup_dir = dir.path().display().to_string();
    let container = dir.path().join("opt/app");
    std::fs::create_dir_all(&container).unwrap();

    for stamp in ["20240301000000", "20240101000000", "20240201000000"] {
        std::fs::write(container.join(format!("server.{stamp}")), stamp).unwrap();
    }
    // Sibling noise that must be ignored.
    std::fs::write(container.join("server.new"), "x").unwrap();
    std::fs::write(container.join("server.backup"), "x").unwrap();

    let backups = list_backups(&backup_dir, "/opt/app/server");
    assert_eq!(backups.len(), 3);
    assert!(backups[0].ends_with("server.20240101000000"));
    assert!(backups[2].ends_with("server.20240301000000"));
}

#[test]
fn prune_keeps_the_newest_n() {
    let dir = tempfile::tempdir().unwrap();
    let backup_dir = dir.path().display().to_string();
    let container = dir.path().join("opt/app");
    std::fs::create_dir_all(&container).unwrap();

    for day in 1..=5 {
        std::fs::write(
            container.join(format!("server.2024010{day}000000")),
            day.to_string(),
        )
        .unwrap();
    }

    prune_backups(&backup_dir, "/opt/app/server", 2);

    let remaining = list_backups(&backup_dir, "/opt/app/server");
    assert_eq!(remaining.len(), 2);
    assert!(remaining[0].ends_with("server.20240104000000"));
    assert!(remaining[1].ends_with("server.20240105000000"));
}

#[test]
fn prune_with_enough_room_removes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let backup_dir = dir.path().display().to_string();
    std::fs::write(dir.path().join("app.20240101000000"), "1").unwrap();

    prune_backups(&backup_dir, "/app", 10);
    assert_eq!(list_backups(&backup_dir, "/app").len(), 1);
}

#[test]
fn copy_preserving_copies_content_and_mode() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.bin");
    let dst = dir.path().join("dst.bin");
    std::fs::write(&src, b"payload bytes").unwrap();
    std::fs::set_permissions(&src, Permissions::from_mode(0o741)).unwrap();

    let perm = std::fs::metadata(&src).unwrap().permissions();
    copy_preserving(&dst.display().to_string(), &src.display().to_string(), perm).unwrap();

    assert_eq!(std::fs::read(&dst).unwrap(), b"payload bytes");
    let mode = std::fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o741);
}
