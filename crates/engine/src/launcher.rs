// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Launcher and reaper for monitored children.
//!
//! `start` spawns the child with both pipes wired into a fresh output sink
//! and publishes the handle under the record guard; a reaper task waits for
//! the exit, joins the pipe forwarders, clears the handle it published and
//! drives crash capture. `kill` signals the child and polls until the
//! reaper has cleared the handle.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::output::OutputSink;
use crate::record::{ChildHandle, ProcessRecord};
use crate::trace::Trace;

enum SpawnOutcome {
    Already,
    Failed(std::io::Error),
    Started {
        handle: ChildHandle,
        child: Child,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
        sink: Arc<Mutex<OutputSink>>,
    },
}

/// Start the record's child if it is not already running.
///
/// Publishing happens under the record guard, so concurrent starts race for
/// the guard and exactly one spawns; the loser reports "already started".
pub async fn start(record: &Arc<ProcessRecord>, trace: &mut dyn Trace) {
    match spawn_locked(record) {
        SpawnOutcome::Already => {
            trace
                .line(&format!("Process:{} already started.", record.program))
                .await;
        }
        SpawnOutcome::Failed(err) => {
            tracing::error!(program = %record.program, error = %err, "spawn failed");
            trace
                .line(&format!(
                    "Failed to start process:{} for reason:{}",
                    record.program, err
                ))
                .await;
        }
        SpawnOutcome::Started {
            handle,
            child,
            stdout,
            stderr,
            sink,
        } => {
            let out_task = forward(stdout, Arc::clone(&sink));
            let err_task = forward(stderr, Arc::clone(&sink));
            spawn_reaper(Arc::clone(record), child, handle, [out_task, err_task]);
            trace
                .line(&format!(
                    "Start process:{} [{}] success.",
                    record.program,
                    record.args.join(" ")
                ))
                .await;
        }
    }
}

fn spawn_locked(record: &Arc<ProcessRecord>) -> SpawnOutcome {
    let mut state = record.state();
    if state.child.is_some() {
        return SpawnOutcome::Already;
    }

    let mut cmd = Command::new(&record.program);
    cmd.args(&record.args);
    for entry in &state.env {
        if let Some((key, value)) = entry.split_once('=') {
            cmd.env(key, value);
        }
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return SpawnOutcome::Failed(err),
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let sink = Arc::new(Mutex::new(OutputSink::new(
        state.log_path.clone(),
        &state.crash.prefix,
    )));

    state.generation += 1;
    let handle = ChildHandle {
        pid: child.id().map(|p| p as i32).unwrap_or(-1),
        generation: state.generation,
    };
    state.child = Some(handle);
    state.auto_restart = true;
    state.sink = Some(Arc::clone(&sink));

    SpawnOutcome::Started {
        handle,
        child,
        stdout,
        stderr,
        sink,
    }
}

/// Drain one child pipe into the shared sink.
///
/// The pipe is drained to EOF even when log writes fail, so a broken log
/// file never backs up into the child.
fn forward(
    pipe: Option<impl AsyncReadExt + Unpin + Send + 'static>,
    sink: Arc<Mutex<OutputSink>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Err(err) = sink.lock().write(&buf[..n]) {
                        tracing::debug!(error = %err, "child output write failed");
                    }
                }
            }
        }
    })
}

fn spawn_reaper(
    record: Arc<ProcessRecord>,
    mut child: Child,
    handle: ChildHandle,
    forwarders: [JoinHandle<()>; 2],
) {
    tokio::spawn(async move {
        let status = child.wait().await;
        // Forwarders hit EOF once the child is gone; joining them first
        // upholds the "handle cleared implies output drained" invariant.
        for task in forwarders {
            let _ = task.await;
        }

        let cleanup = {
            let mut state = record.state();
            if state.child == Some(handle) {
                state.child = None;
                let sink = state.sink.take();
                Some((sink, state.crash.command.clone(), state.log_dir.clone()))
            } else {
                None
            }
        };

        tracing::info!(
            program = %record.program,
            pid = handle.pid,
            status = ?status.as_ref().ok(),
            "process stoped"
        );

        let Some((sink, crash_command, log_dir)) = cleanup else {
            return;
        };
        let crash = sink.map(|s| s.lock().take_crash()).unwrap_or_default();
        if !crash.is_empty() {
            handle_crash(&record, handle.pid, &crash, &log_dir, &crash_command).await;
        }
    });
}

async fn handle_crash(
    record: &ProcessRecord,
    pid: i32,
    crash: &[u8],
    log_dir: &Path,
    crash_command: &[String],
) {
    let base = Path::new(&record.program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.program.clone());
    let dump_path = log_dir.join(format!("{base}-crash-{pid}.log"));
    match std::fs::write(&dump_path, crash) {
        Ok(()) => tracing::info!(path = %dump_path.display(), "crash output dumped"),
        Err(err) => {
            tracing::error!(path = %dump_path.display(), error = %err, "crash dump failed")
        }
    }

    let Some((program, args)) = crash_command.split_first() else {
        return;
    };
    let content = String::from_utf8_lossy(crash);
    let hostname = std::env::var("HOSTNAME").unwrap_or_default();
    let mut cmd = Command::new(substitute_crash_arg(program, &content, &hostname));
    for arg in args {
        cmd.arg(substitute_crash_arg(arg, &content, &hostname));
    }
    match cmd.output().await {
        Ok(out) if out.status.success() => {
            tracing::info!(program = %record.program, "crash command finished");
        }
        Ok(out) => {
            tracing::error!(program = %record.program, status = ?out.status, "crash command failed");
        }
        Err(err) => {
            tracing::error!(program = %record.program, error = %err, "crash command failed to run");
        }
    }
}

/// Substitute `${CrashContent}` and `${HOSTNAME}` in one crash-command arg.
pub fn substitute_crash_arg(arg: &str, content: &str, hostname: &str) -> String {
    arg.replace("${CrashContent}", content)
        .replace("${HOSTNAME}", hostname)
}

/// Kill the record's child and wait for the reaper to clear the handle.
///
/// `kill_timeout` bounds the wait in seconds; `0` polls forever, which is
/// the historical behavior operators rely on (the command blocks until the
/// child is actually gone).
pub async fn kill(record: &Arc<ProcessRecord>, kill_timeout: u64, trace: &mut dyn Trace) {
    let target = {
        let mut state = record.state();
        match state.child {
            Some(handle) => {
                state.auto_restart = false;
                Some(handle)
            }
            None => None,
        }
    };
    let Some(handle) = target else {
        trace
            .line(&format!("No running process:{}", record.program))
            .await;
        return;
    };

    if let Err(err) = signal::kill(Pid::from_raw(handle.pid), Signal::SIGKILL) {
        tracing::warn!(program = %record.program, pid = handle.pid, error = %err, "kill signal failed");
    }

    let mut waited = 0u64;
    loop {
        if !record.is_running() {
            trace
                .line(&format!("Kill process:{} success.", record.program))
                .await;
            return;
        }
        if kill_timeout > 0 && waited >= kill_timeout {
            trace
                .line(&format!(
                    "Process:{} not killed after {}s, giving up.",
                    record.program, kill_timeout
                ))
                .await;
            return;
        }
        trace
            .line(&format!(
                "Process:{} not killed, wait 1 sec.",
                record.program
            ))
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        waited += 1;
    }
}

/// Kill then start, with the same trace for both halves.
pub async fn restart(record: &Arc<ProcessRecord>, kill_timeout: u64, trace: &mut dyn Trace) {
    kill(record, kill_timeout, trace).await;
    start(record, trace).await;
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
