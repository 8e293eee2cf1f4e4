// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One monitored process: configured identity plus guarded runtime state.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use pmon_core::{CheckConfig, CrashConfig};

use crate::output::OutputSink;

/// Identity of one spawned child.
///
/// The generation counter lets the reaper clear exactly the handle it was
/// started with, so a reap racing a manual restart never clears the
/// successor's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildHandle {
    pub pid: i32,
    pub generation: u64,
}

/// Mutable per-record state, all behind the record guard.
///
/// The config-derived fields (`env`, `log_path`, `check`, `crash`,
/// `log_dir`) are refreshed in place on config reload; the runtime fields
/// survive the reload untouched.
pub struct RecordState {
    pub env: Vec<String>,
    pub log_path: PathBuf,
    pub log_dir: PathBuf,
    pub check: CheckConfig,
    pub crash: CrashConfig,
    pub child: Option<ChildHandle>,
    pub auto_restart: bool,
    pub last_check: i64,
    pub sink: Option<Arc<Mutex<OutputSink>>>,
    pub generation: u64,
}

/// One entry of the process table.
///
/// `command_line` is the table key; `program` and `args` are split from it
/// once at registration and never change for the life of the record.
pub struct ProcessRecord {
    pub command_line: String,
    pub program: String,
    pub args: Vec<String>,
    state: Mutex<RecordState>,
}

impl ProcessRecord {
    pub fn new(command_line: String, program: String, args: Vec<String>) -> Self {
        Self {
            command_line,
            program,
            args,
            state: Mutex::new(RecordState {
                env: Vec::new(),
                log_path: PathBuf::new(),
                log_dir: PathBuf::new(),
                check: CheckConfig::default(),
                crash: CrashConfig::default(),
                child: None,
                auto_restart: true,
                last_check: 0,
                sink: None,
                generation: 0,
            }),
        }
    }

    /// Lock the record guard.
    pub fn state(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().child.is_some()
    }

    pub fn pid(&self) -> Option<i32> {
        self.state.lock().child.map(|h| h.pid)
    }

    pub fn set_auto_restart(&self, value: bool) {
        self.state.lock().auto_restart = value;
    }

    /// Refresh the config-derived fields in place, preserving runtime state.
    pub fn refresh_config(
        &self,
        env: Vec<String>,
        log_path: PathBuf,
        log_dir: PathBuf,
        check: CheckConfig,
        crash: CrashConfig,
    ) {
        let mut state = self.state.lock();
        state.env = env;
        state.log_path = log_path;
        state.log_dir = log_dir;
        state.check = check;
        state.crash = crash;
    }
}

impl std::fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProcessRecord")
            .field("command_line", &self.command_line)
            .field("child", &state.child)
            .field("auto_restart", &state.auto_restart)
            .finish()
    }
}
