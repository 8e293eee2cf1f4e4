// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for the process-control and utility admin commands.

use std::process::Stdio;

use pmon_engine::launcher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::process::Command;

use super::{send_line, AdminCtx, ConnTrace, Verdict};
use crate::protocol;

pub(crate) async fn help(writer: &mut OwnedWriteHalf) -> Verdict {
    let _ = writer.write_all(protocol::USAGE.as_bytes()).await;
    Verdict::Success
}

/// Tab-separated table of every monitored record.
pub(crate) async fn ps(writer: &mut OwnedWriteHalf, ctx: &AdminCtx) -> Verdict {
    let mut out = String::from("PID\tProcess\tArgs\tStatus\r\n");
    for record in ctx.table.snapshot() {
        let (pid, status) = match record.pid() {
            Some(pid) => (pid, "running"),
            None => (-1, "stoped"),
        };
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\r\n",
            pid,
            record.program,
            record.args.join(" "),
            status
        ));
    }
    let _ = writer.write_all(out.as_bytes()).await;
    Verdict::Success
}

pub(crate) async fn start(args: &[&str], writer: &mut OwnedWriteHalf, ctx: &AdminCtx) -> Verdict {
    let records = ctx.table.lookup_by_prefix(args[0]);
    if records.is_empty() {
        send_line(writer, &format!("No process '{}' configured", args[0])).await;
        return Verdict::Fail;
    }
    let mut tracer = ConnTrace::new(writer);
    for record in &records {
        launcher::start(record, &mut tracer).await;
    }
    Verdict::Success
}

pub(crate) async fn stop(args: &[&str], writer: &mut OwnedWriteHalf, ctx: &AdminCtx) -> Verdict {
    let records = ctx.table.lookup_by_prefix(args[0]);
    if records.is_empty() {
        send_line(writer, &format!("No process '{}' configured", args[0])).await;
        return Verdict::Fail;
    }
    let kill_timeout = ctx.kill_timeout();
    let mut tracer = ConnTrace::new(writer);
    for record in &records {
        launcher::kill(record, kill_timeout, &mut tracer).await;
    }
    Verdict::Success
}

pub(crate) async fn restart(args: &[&str], writer: &mut OwnedWriteHalf, ctx: &AdminCtx) -> Verdict {
    let records = ctx.table.lookup_by_prefix(args[0]);
    if records.is_empty() {
        send_line(writer, &format!("No process '{}' configured", args[0])).await;
        return Verdict::Fail;
    }
    let kill_timeout = ctx.kill_timeout();
    let mut tracer = ConnTrace::new(writer);
    for record in &records {
        launcher::restart(record, kill_timeout, &mut tracer).await;
    }
    Verdict::Success
}

/// Run an ad-hoc command, streaming stdout and stderr to the client.
///
/// The two pipes are forwarded as chunks arrive with no synchronization
/// between them; interleaving is whatever the child produced. Chunks are
/// also teed to the daemon log at debug level.
pub(crate) async fn system(args: &[&str], writer: &mut OwnedWriteHalf) -> Verdict {
    let Some((program, rest)) = args.split_first() else {
        send_line(writer, "Failed to exec command for reason:empty command").await;
        return Verdict::Fail;
    };

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            send_line(writer, &format!("Failed to exec command for reason:{err}")).await;
            return Verdict::Fail;
        }
    };

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut obuf = [0u8; 8192];
    let mut ebuf = [0u8; 8192];

    enum Chunk {
        Out(usize),
        Err(usize),
    }

    loop {
        let chunk = match (&mut stdout, &mut stderr) {
            (None, None) => break,
            (Some(out), None) => Chunk::Out(out.read(&mut obuf).await.unwrap_or(0)),
            (None, Some(err)) => Chunk::Err(err.read(&mut ebuf).await.unwrap_or(0)),
            (Some(out), Some(err)) => tokio::select! {
                n = out.read(&mut obuf) => Chunk::Out(n.unwrap_or(0)),
                n = err.read(&mut ebuf) => Chunk::Err(n.unwrap_or(0)),
            },
        };
        match chunk {
            Chunk::Out(0) => stdout = None,
            Chunk::Err(0) => stderr = None,
            Chunk::Out(n) => {
                tracing::debug!(output = %String::from_utf8_lossy(&obuf[..n]), "system stdout");
                let _ = writer.write_all(&obuf[..n]).await;
            }
            Chunk::Err(n) => {
                tracing::debug!(output = %String::from_utf8_lossy(&ebuf[..n]), "system stderr");
                let _ = writer.write_all(&ebuf[..n]).await;
            }
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => Verdict::Success,
        Ok(status) => {
            send_line(writer, &format!("Failed to exec command for reason:{status}")).await;
            Verdict::Fail
        }
        Err(err) => {
            send_line(writer, &format!("Failed to exec command for reason:{err}")).await;
            Verdict::Fail
        }
    }
}

/// Kill every monitored record and take the daemon down.
pub(crate) async fn shutdown(writer: &mut OwnedWriteHalf, ctx: &AdminCtx) -> Verdict {
    let kill_timeout = ctx.kill_timeout();
    let mut tracer = ConnTrace::new(writer);
    for record in ctx.table.snapshot() {
        launcher::kill(&record, kill_timeout, &mut tracer).await;
    }
    ctx.shutdown.notify_one();
    Verdict::SuccessClose
}
