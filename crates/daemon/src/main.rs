// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pmon daemon (pmond)
//!
//! Per-node process supervisor with a line-oriented admin protocol.
//!
//! Architecture:
//! - Accept loop: serves one admin connection at a time on the main task
//! - Health checker: one 1 Hz task over the whole process table
//! - Config watcher: 5 s mtime poll, in-place table rebuild
//! - Reapers/forwarders: per-child tasks owned by the engine

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod listener;
mod protocol;
mod reexec;

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use pmon_core::Config;
use pmon_engine::{Checker, ProcessTable};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

use crate::listener::AdminCtx;

/// Pid file written next to the daemon's working directory: the
/// supervisor's own pid first, then one line per running child.
const PID_FILE: &str = ".pids";

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    conf: String,
    graceful: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut conf = "./conf/pmon.json".to_string();
    let mut graceful = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-conf" | "--conf" => {
                conf = iter
                    .next()
                    .ok_or_else(|| "missing value for -conf".to_string())?
                    .clone();
            }
            "-graceful" | "--graceful" => graceful = true,
            other => {
                if let Some(value) = other
                    .strip_prefix("--conf=")
                    .or_else(|| other.strip_prefix("-conf="))
                {
                    conf = value.to_string();
                } else {
                    return Err(format!("unexpected argument '{other}'"));
                }
            }
        }
    }
    Ok(CliArgs { conf, graceful })
}

fn absolutize(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before touching config or sockets
    let argv: Vec<String> = std::env::args().collect();
    match argv.get(1).map(String::as_str) {
        Some("--version" | "-V") => {
            println!("pmond {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help" | "-h" | "help") => {
            println!("pmond {}", env!("CARGO_PKG_VERSION"));
            println!("pmon daemon - supervises configured processes and serves the admin protocol");
            println!();
            println!("USAGE:");
            println!("    pmond [-conf <path>] [-graceful]");
            println!();
            println!("OPTIONS:");
            println!("    -conf <path>     Config file (default: ./conf/pmon.json)");
            println!("    -graceful        Adopt the listener from fd 3 (internal use only)");
            println!("    -h, --help       Print help information");
            println!("    -V, --version    Print version information");
            return Ok(());
        }
        _ => {}
    }

    let cli = match parse_args(&argv[1..]) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("Usage: pmond [-conf <path>] [-graceful]");
            std::process::exit(1);
        }
    };

    let conf_path = absolutize(&cli.conf);
    let config = match Config::load(&conf_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    lifecycle::ensure_dirs(&config)?;

    // Rotate the daemon log if it has grown too large, then log to it
    let log_path = Path::new(&config.log_dir).join("pmond.log");
    rotate_log_if_needed(&log_path);
    let log_guard = setup_logging(&config.log_dir)?;

    info!(config = %conf_path.display(), "starting pmond");

    let table = Arc::new(ProcessTable::new());
    table.rebuild(&config.monitor, &config.log_dir);

    // Bind the admin listener, or adopt the one a predecessor handed down
    let admin_listener = if cli.graceful {
        let inherited = reexec::adopt_inherited_listener()?;
        let adopted = tokio::net::TcpListener::from_std(inherited)?;
        reexec::terminate_parent();
        adopted
    } else {
        match tokio::net::TcpListener::bind(&config.listen).await {
            Ok(bound) => bound,
            Err(err) => {
                error!(addr = %config.listen, error = %err, "bind socket failed");
                return Err(err.into());
            }
        }
    };
    let listen_fd = admin_listener.as_raw_fd();

    let shared_config = Arc::new(Mutex::new(config));
    tokio::spawn(lifecycle::watch_config(
        conf_path,
        Arc::clone(&shared_config),
        Arc::clone(&table),
    ));

    let checker = Checker::new(Arc::clone(&table), PathBuf::from(PID_FILE));
    tokio::spawn(checker.run());

    let shutdown = Arc::new(Notify::new());
    let ctx = AdminCtx {
        table,
        config: shared_config,
        self_path: argv.first().cloned().unwrap_or_default(),
        self_args: argv[1..].to_vec(),
        listen_fd,
        shutdown: Arc::clone(&shutdown),
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let local_addr = admin_listener.local_addr()?;
    info!(addr = %local_addr, "pmond ready");

    // Readiness marker for wrappers waiting on startup
    println!("READY {local_addr}");

    loop {
        tokio::select! {
            accepted = admin_listener.accept() => {
                match accepted {
                    // Only one admin connection is served at a time; the
                    // accept loop processes it inline.
                    Ok((stream, _)) => listener::handle_conn(stream, &ctx).await,
                    Err(err) => error!(error = %err, "accept error"),
                }
            }

            _ = shutdown.notified() => {
                info!("shutdown requested via admin command");
                break;
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    info!("pmond stopped");
    drop(log_guard);
    Ok(())
}

/// Maximum daemon log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated daemon logs to keep (pmond.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log at startup if it exceeds [`MAX_LOG_SIZE`].
///
/// Best-effort: rotation failures are ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let base = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let _ = std::fs::rename(format!("{base}.{i}"), format!("{base}.{}", i + 1));
    }
    let _ = std::fs::rename(log_path, format!("{base}.1"));
}

fn setup_logging(
    log_dir: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file_appender = tracing_appender::rolling::never(log_dir, "pmond.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
