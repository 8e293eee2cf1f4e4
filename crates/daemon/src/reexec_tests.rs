// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Re-exec argv construction tests

use super::*;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn graceful_flag_is_appended() {
    assert_eq!(
        build_reexec_args(&args(&["-conf", "/etc/pmon.json"])),
        args(&["-conf", "/etc/pmon.json", "-graceful"])
    );
    assert_eq!(build_reexec_args(&[]), args(&["-graceful"]));
}

#[test]
fn graceful_flag_is_not_duplicated() {
    assert_eq!(
        build_reexec_args(&args(&["-conf", "/etc/pmon.json", "-graceful"])),
        args(&["-conf", "/etc/pmon.json", "-graceful"])
    );
}
