// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful self-replacement.
//!
//! When the supervisor's own binary is updated, a successor is spawned with
//! the admin listener's fd dup'd to fd 3 across the exec. The successor,
//! started with `-graceful`, adopts fd 3 instead of binding and then
//! SIGTERMs its parent. The kernel listen queue is shared the whole time,
//! so connections in flight are never rejected.

use std::os::fd::RawFd;
use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use pmon_engine::{launcher, Trace};
use tokio::process::Command;

use crate::listener::AdminCtx;

/// Fd position the successor finds the listener at.
pub(crate) const LISTEN_FD: RawFd = 3;

/// Current argv with `-graceful` appended exactly once.
pub(crate) fn build_reexec_args(args: &[String]) -> Vec<String> {
    let mut args = args.to_vec();
    if !args.iter().any(|a| a == "-graceful") {
        args.push("-graceful".to_string());
    }
    args
}

/// Kill every child and launch the successor with the inherited listener.
///
/// The successor restarts the children from its own config; this process
/// exits once the successor signals it (see the SIGTERM arm of the accept
/// loop).
pub(crate) async fn graceful_restart(ctx: &AdminCtx, trace: &mut dyn Trace) {
    let kill_timeout = ctx.config.lock().kill_timeout;
    for record in ctx.table.snapshot() {
        launcher::kill(&record, kill_timeout, trace).await;
    }
    trace.line("Restart pmond self.").await;

    let mut cmd = Command::new(&ctx.self_path);
    cmd.args(build_reexec_args(&ctx.self_args))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let fd = ctx.listen_fd;
    unsafe {
        cmd.pre_exec(move || {
            if fd == LISTEN_FD {
                // Already in position; just make sure it survives the exec.
                let flags = libc::fcntl(LISTEN_FD, libc::F_GETFD);
                if flags < 0
                    || libc::fcntl(LISTEN_FD, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0
                {
                    return Err(std::io::Error::last_os_error());
                }
            } else if libc::dup2(fd, LISTEN_FD) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    match cmd.spawn() {
        Ok(_successor) => {
            tracing::info!(path = %ctx.self_path, "graceful successor launched");
        }
        Err(err) => {
            tracing::error!(error = %err, "graceful restart failed to launch");
            trace
                .line(&format!("Failed to restart pmond self for reason:{err}"))
                .await;
        }
    }
}

/// Adopt the listener a predecessor passed down at fd 3.
pub(crate) fn adopt_inherited_listener() -> std::io::Result<std::net::TcpListener> {
    use std::os::fd::FromRawFd;
    let listener = unsafe { std::net::TcpListener::from_raw_fd(LISTEN_FD) };
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Tell the predecessor its hand-off is complete.
pub(crate) fn terminate_parent() {
    let parent = nix::unistd::getppid();
    tracing::info!(parent = %parent, "listener adopted, terminating predecessor");
    if let Err(err) = signal::kill(parent, Signal::SIGTERM) {
        tracing::error!(parent = %parent, error = %err, "failed to signal predecessor");
    }
}

#[cfg(test)]
#[path = "reexec_tests.rs"]
mod tests;
