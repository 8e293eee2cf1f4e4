// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin connection state machine.
//!
//! The accept loop in `main` hands each connection here and awaits the
//! result, so one admin connection is served at a time (a deliberate
//! simplification inherited from the original design). Per connection:
//! optional auth line, then a command loop that dispatches to the handlers
//! and writes exactly one `PMON_SUCCESS`/`PMON_FAIL` terminator per
//! accepted command.

mod commands;
mod update;

use std::os::fd::RawFd;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pmon_core::Config;
use pmon_engine::{ProcessTable, Trace};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::protocol;

/// Shared daemon context for all admin handlers.
pub(crate) struct AdminCtx {
    pub table: Arc<ProcessTable>,
    pub config: Arc<Mutex<Config>>,
    /// argv[0] as the daemon was invoked; uploads to this path trigger a
    /// graceful re-exec.
    pub self_path: String,
    /// argv[1..] as invoked, replayed on re-exec.
    pub self_args: Vec<String>,
    /// Raw fd of the admin listener, inherited across re-exec.
    pub listen_fd: RawFd,
    pub shutdown: Arc<Notify>,
}

impl AdminCtx {
    fn kill_timeout(&self) -> u64 {
        self.config.lock().kill_timeout
    }
}

/// What a handler decided: terminator to write, and whether the connection
/// closes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Success,
    Fail,
    SuccessClose,
    FailClose,
}

pub(crate) type ConnReader = BufReader<OwnedReadHalf>;

/// Write one CRLF-terminated line to the client.
pub(crate) async fn send_line(writer: &mut OwnedWriteHalf, msg: &str) {
    let _ = writer.write_all(msg.as_bytes()).await;
    let _ = writer.write_all(b"\r\n").await;
}

/// Trace that echoes progress lines to the admin client and the daemon log.
pub(crate) struct ConnTrace<'a> {
    writer: &'a mut OwnedWriteHalf,
}

impl<'a> ConnTrace<'a> {
    pub fn new(writer: &'a mut OwnedWriteHalf) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl Trace for ConnTrace<'_> {
    async fn line(&mut self, msg: &str) {
        tracing::info!("{msg}");
        send_line(self.writer, msg).await;
    }
}

enum LineStatus {
    Eof,
    Line,
    TooLong,
}

/// Read one command line, bounded so an endless line cannot grow the buffer.
async fn read_command_line(
    reader: &mut ConnReader,
    buf: &mut Vec<u8>,
) -> std::io::Result<LineStatus> {
    let cap = (protocol::MAX_LINE_BYTES + 16) as u64;
    let mut limited = (&mut *reader).take(cap);
    let n = limited.read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineStatus::Eof);
    }
    let unterminated = !buf.ends_with(b"\n");
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > protocol::MAX_LINE_BYTES || (unterminated && buf.len() as u64 >= cap) {
        return Ok(LineStatus::TooLong);
    }
    Ok(LineStatus::Line)
}

/// Serve one admin connection to completion.
pub(crate) async fn handle_conn(stream: TcpStream, ctx: &AdminCtx) {
    let peer = stream.peer_addr().ok();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut authed = ctx.config.lock().auth.is_empty();
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match read_command_line(&mut reader, &mut raw).await {
            Ok(LineStatus::Line) => {}
            Ok(LineStatus::Eof) | Err(_) => break,
            Ok(LineStatus::TooLong) => {
                tracing::error!(peer = ?peer, "too long command from client");
                break;
            }
        }
        let text = String::from_utf8_lossy(&raw);
        let line = text.trim();

        if !authed {
            let expected = ctx.config.lock().auth.clone();
            if expected.trim() == line {
                authed = true;
                continue;
            }
            send_line(&mut writer, "Connection auth failed").await;
            return;
        }

        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else {
            continue;
        };
        let args: Vec<&str> = fields.collect();

        let Some(spec) = protocol::lookup(name) else {
            send_line(&mut writer, &format!("Error:unknown command:{line}")).await;
            continue;
        };
        if !spec.accepts(args.len()) {
            send_line(
                &mut writer,
                &format!("Invalid command args:{args:?} for '{name}'"),
            )
            .await;
            continue;
        }

        tracing::info!(command = %line, peer = ?peer, "execute admin command");
        let verdict = dispatch(spec.name, &args, &mut reader, &mut writer, ctx).await;
        let (terminator, close) = match verdict {
            Verdict::Success => (protocol::SUCCESS_LINE, false),
            Verdict::Fail => (protocol::FAIL_LINE, false),
            Verdict::SuccessClose => (protocol::SUCCESS_LINE, true),
            Verdict::FailClose => (protocol::FAIL_LINE, true),
        };
        let _ = writer.write_all(terminator).await;
        let _ = writer.flush().await;
        if close {
            break;
        }
    }
}

async fn dispatch(
    name: &str,
    args: &[&str],
    reader: &mut ConnReader,
    writer: &mut OwnedWriteHalf,
    ctx: &AdminCtx,
) -> Verdict {
    match name {
        "help" => commands::help(writer).await,
        "ps" => commands::ps(writer, ctx).await,
        "system" => commands::system(args, writer).await,
        "start" => commands::start(args, writer, ctx).await,
        "stop" => commands::stop(args, writer, ctx).await,
        "restart" => commands::restart(args, writer, ctx).await,
        "shutdown" => commands::shutdown(writer, ctx).await,
        "upload" => update::upload(args, reader, writer, ctx).await,
        "rollback" => update::rollback(args, writer, ctx).await,
        "exit" | "quit" => Verdict::SuccessClose,
        _ => Verdict::Fail,
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
