// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health checker: a single 1 Hz task over the whole process table.
//!
//! Each tick restarts exited children that still want auto-restart and
//! probes the configured TCP endpoint of running ones. A failed probe gets
//! the child SIGKILLed; the reaper clears the handle and a later tick
//! restarts it. After any tick that changed running state the pid file is
//! rewritten.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::net::TcpStream;

use crate::launcher;
use crate::record::ProcessRecord;
use crate::table::ProcessTable;
use crate::trace::LogTrace;

enum Action {
    Start,
    Probe { addr: String, timeout: u64, pid: i32 },
    Nothing,
}

pub struct Checker {
    table: Arc<ProcessTable>,
    pid_path: PathBuf,
    interval: Duration,
}

impl Checker {
    pub fn new(table: Arc<ProcessTable>, pid_path: PathBuf) -> Self {
        Self {
            table,
            pid_path,
            interval: Duration::from_millis(1000),
        }
    }

    #[cfg(test)]
    pub fn with_interval(table: Arc<ProcessTable>, pid_path: PathBuf, interval: Duration) -> Self {
        Self {
            table,
            pid_path,
            interval,
        }
    }

    pub async fn run(self) {
        self.dump_pids();
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let mut changed = false;
            for record in self.table.snapshot() {
                if check_record(&record).await {
                    changed = true;
                }
            }
            if changed {
                self.dump_pids();
            }
        }
    }

    /// Serialize the supervisor pid followed by each running child pid.
    fn dump_pids(&self) {
        let mut lines = format!("{}\n", std::process::id());
        for record in self.table.snapshot() {
            if let Some(pid) = record.pid() {
                lines.push_str(&format!("{pid}\n"));
            }
        }
        if let Err(err) = std::fs::write(&self.pid_path, lines) {
            tracing::error!(path = %self.pid_path.display(), error = %err, "pid file write failed");
        }
    }
}

/// Examine one record; returns whether its running state changed.
async fn check_record(record: &Arc<ProcessRecord>) -> bool {
    match assess(record, unix_now()) {
        Action::Start => {
            launcher::start(record, &mut LogTrace).await;
            true
        }
        Action::Probe { addr, timeout, pid } => {
            if probe(&addr, timeout).await {
                false
            } else {
                tracing::error!(
                    program = %record.program,
                    addr = %addr,
                    "kill process since check failed"
                );
                let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
                true
            }
        }
        Action::Nothing => false,
    }
}

/// Decide what this tick owes the record, under its guard.
fn assess(record: &Arc<ProcessRecord>, now: i64) -> Action {
    let mut state = record.state();
    let running = state.child.is_some();
    if state.auto_restart && !running {
        return Action::Start;
    }
    if !running || state.check.addr.is_empty() {
        return Action::Nothing;
    }
    // First eligible tick only arms the timer; the probe waits one period.
    if state.last_check == 0 {
        state.last_check = now;
    }
    if now - state.last_check >= state.check.period as i64 {
        state.last_check = now;
        if let Some(handle) = state.child {
            return Action::Probe {
                addr: state.check.addr.clone(),
                timeout: state.check.timeout,
                pid: handle.pid,
            };
        }
    }
    Action::Nothing
}

/// TCP connect probe; the connection is closed as soon as it opens.
async fn probe(addr: &str, timeout_secs: u64) -> bool {
    if timeout_secs == 0 {
        return TcpStream::connect(addr).await.is_ok();
    }
    matches!(
        tokio::time::timeout(Duration::from_secs(timeout_secs), TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod tests;
