// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin wire protocol constants and command table.
//!
//! The protocol is line-oriented CRLF text. Every accepted command is
//! answered with exactly one terminator line; rejected commands (unknown
//! name, bad arg count) get an error line and no terminator. File uploads
//! are the one binary exception: a 12-byte framed header plus payload
//! immediately follows the `upload` command line.

use thiserror::Error;

/// Terminator after a handler that succeeded.
pub const SUCCESS_LINE: &[u8] = b"PMON_SUCCESS\r\n";

/// Terminator after a handler that failed.
pub const FAIL_LINE: &[u8] = b"PMON_FAIL\r\n";

/// Magic prefix of the upload frame header.
pub const FRAME_MAGIC: [u8; 4] = *b"PMON";

/// Upload frame header: 4-byte magic + 8-byte little-endian length.
pub const FRAME_HEADER_LEN: usize = 12;

/// Command lines longer than this close the connection.
pub const MAX_LINE_BYTES: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid magic header")]
    BadMagic,
}

/// Parse an upload frame header, returning the declared payload length.
pub fn parse_frame_header(header: &[u8; FRAME_HEADER_LEN]) -> Result<u64, FrameError> {
    if header[0..4] != FRAME_MAGIC {
        return Err(FrameError::BadMagic);
    }
    let mut length = [0u8; 8];
    length.copy_from_slice(&header[4..12]);
    Ok(u64::from_le_bytes(length))
}

/// Argument bounds for one admin command. `max_args == -1` means unbounded.
pub struct CommandSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: isize,
}

impl CommandSpec {
    pub fn accepts(&self, n: usize) -> bool {
        if n < self.min_args {
            return false;
        }
        self.max_args < 0 || n <= self.max_args as usize
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "help", min_args: 0, max_args: 0 },
    CommandSpec { name: "ps", min_args: 0, max_args: 0 },
    CommandSpec { name: "system", min_args: 0, max_args: -1 },
    CommandSpec { name: "upload", min_args: 1, max_args: 1 },
    CommandSpec { name: "rollback", min_args: 1, max_args: 2 },
    CommandSpec { name: "start", min_args: 1, max_args: 1 },
    CommandSpec { name: "stop", min_args: 1, max_args: 1 },
    CommandSpec { name: "restart", min_args: 1, max_args: 1 },
    CommandSpec { name: "shutdown", min_args: 0, max_args: 0 },
    CommandSpec { name: "exit", min_args: 0, max_args: 0 },
    CommandSpec { name: "quit", min_args: 0, max_args: 0 },
];

/// Case-insensitive command lookup.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

pub const USAGE: &str = "\
Supported Commands:\r\n\
PS                                 list monitored processes\r\n\
System   <command> <args>          WARN:exec system command\r\n\
Upload   <file path>               upload file (framed payload follows)\r\n\
Rollback <file path> [postfix]     rollback updated file\r\n\
Start    <process>                 start process\r\n\
Restart  <process>                 WARN:restart process\r\n\
Stop     <process>                 WARN:stop process\r\n\
Shutdown                           WARN:stop whole service\r\n\
Exit                               exit current connection\r\n";

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
