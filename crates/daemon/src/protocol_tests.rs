// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol table and frame header tests

use super::*;

#[test]
fn frame_header_roundtrip() {
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0..4].copy_from_slice(b"PMON");
    header[4..12].copy_from_slice(&42u64.to_le_bytes());

    assert_eq!(parse_frame_header(&header), Ok(42));
}

#[test]
fn frame_header_rejects_bad_magic() {
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0..4].copy_from_slice(b"XXXX");
    header[4..12].copy_from_slice(&5u64.to_le_bytes());

    assert_eq!(parse_frame_header(&header), Err(FrameError::BadMagic));
}

#[test]
fn frame_length_is_little_endian() {
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0..4].copy_from_slice(b"PMON");
    header[4] = 0x01;
    header[5] = 0x02;

    assert_eq!(parse_frame_header(&header), Ok(0x0201));
}

#[test]
fn lookup_is_case_insensitive() {
    assert_eq!(lookup("PS").map(|c| c.name), Some("ps"));
    assert_eq!(lookup("Rollback").map(|c| c.name), Some("rollback"));
    assert_eq!(lookup("shutdown").map(|c| c.name), Some("shutdown"));
    assert!(lookup("frobnicate").is_none());
}

#[test]
fn arg_bounds_are_enforced() {
    let upload = lookup("upload").unwrap();
    assert!(!upload.accepts(0));
    assert!(upload.accepts(1));
    assert!(!upload.accepts(2));

    let rollback = lookup("rollback").unwrap();
    assert!(rollback.accepts(1));
    assert!(rollback.accepts(2));
    assert!(!rollback.accepts(3));

    // system takes anything, including a bare invocation
    let system = lookup("system").unwrap();
    assert!(system.accepts(0));
    assert!(system.accepts(100));

    let ps = lookup("ps").unwrap();
    assert!(ps.accepts(0));
    assert!(!ps.accepts(1));
}

#[test]
fn terminators_are_crlf_lines() {
    assert_eq!(SUCCESS_LINE, b"PMON_SUCCESS\r\n");
    assert_eq!(FAIL_LINE, b"PMON_FAIL\r\n");
}
