// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child output sink: size-bounded rotating log file plus crash capture.
//!
//! Every monitored child gets a fresh sink per start. Both pipe forwarders
//! write into it; the reaper drains the crash buffer after the child exits.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

/// Rotation threshold for child logs (1 GiB).
const MAX_LOG_SIZE: u64 = 1024 * 1024 * 1024;

/// Rotated generations kept per child log (`.1`, `.2`).
const MAX_ROTATED_LOGS: u32 = 2;

/// Crash output retained in memory per child (256 KiB).
pub const CRASH_BUFFER_MAX: usize = 256 * 1024;

/// Append-only log file with shift-style rotation.
///
/// The file is opened lazily on first write; an open failure is returned as
/// a write error and retried on the next write, so a missing log directory
/// never takes the supervisor down.
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    max_backups: u32,
    file: Option<File>,
    written: u64,
}

impl RotatingFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_size: MAX_LOG_SIZE,
            max_backups: MAX_ROTATED_LOGS,
            file: None,
            written: 0,
        }
    }

    #[cfg(test)]
    pub fn with_limits(path: PathBuf, max_size: u64, max_backups: u32) -> Self {
        Self {
            path,
            max_size,
            max_backups,
            file: None,
            written: 0,
        }
    }

    fn open(&mut self) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o660)
            .open(&self.path)?;
        self.written = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.file = Some(file);
        Ok(())
    }

    /// Shift older generations and move the current file to `.1`.
    /// Best-effort: a failed rename only costs history.
    fn rotate(&mut self) {
        self.file = None;
        let base = self.path.display().to_string();
        for i in (1..self.max_backups).rev() {
            let _ = std::fs::rename(format!("{base}.{i}"), format!("{base}.{}", i + 1));
        }
        let _ = std::fs::rename(&self.path, format!("{base}.1"));
        self.written = 0;
    }

    pub fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.file.is_none() {
            self.open()?;
        }
        if self.written + data.len() as u64 > self.max_size {
            self.rotate();
            self.open()?;
        }
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(data)?;
                self.written += data.len() as u64;
                Ok(())
            }
            None => Err(std::io::Error::other(format!(
                "log file {} not open",
                self.path.display()
            ))),
        }
    }
}

/// Wraps the rotating log with crash-output detection.
///
/// A write beginning with the configured prefix toggles capturing mode for
/// the remainder of the child's life; captured bytes are buffered (bounded)
/// and still forwarded to the log.
pub struct OutputSink {
    log: RotatingFile,
    crash_prefix: Vec<u8>,
    capturing: bool,
    crash: Vec<u8>,
}

impl OutputSink {
    pub fn new(log_path: PathBuf, crash_prefix: &str) -> Self {
        Self {
            log: RotatingFile::new(log_path),
            crash_prefix: crash_prefix.as_bytes().to_vec(),
            capturing: false,
            crash: Vec::new(),
        }
    }

    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        if !self.capturing
            && !self.crash_prefix.is_empty()
            && data.starts_with(&self.crash_prefix)
        {
            self.capturing = true;
        }
        if self.capturing && self.crash.len() < CRASH_BUFFER_MAX {
            let room = CRASH_BUFFER_MAX - self.crash.len();
            self.crash.extend_from_slice(&data[..data.len().min(room)]);
        }
        self.log.write_all(data)
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Drain the captured crash output.
    pub fn take_crash(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.crash)
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
