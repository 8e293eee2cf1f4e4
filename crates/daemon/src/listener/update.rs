// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-update pipeline: upload with backup + atomic swap, and rollback.
//!
//! Uploads stage into `<UploadDir>/<target>.new` (string concatenation, so
//! absolute targets keep their full path under the staging root), back up
//! the current file with its mtime as a 14-digit suffix, kill every record
//! whose command line starts with the target path, rename into place, then
//! restart. Rollback is the inverse: pick a backup, kill, copy back,
//! restart. Both finish by restoring `auto_restart` on the affected
//! records so the health checker resumes ownership even after errors.

use std::fs::{File, OpenOptions, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use pmon_engine::{launcher, ProcessRecord};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;

use super::{send_line, AdminCtx, ConnReader, ConnTrace, Verdict};
use crate::protocol::{self, FRAME_HEADER_LEN};
use crate::reexec;

#[derive(Debug, Error)]
enum RecvError {
    #[error("short frame header: {0}")]
    Header(std::io::Error),

    #[error("invalid magic header")]
    BadMagic,

    #[error("open {path} failed: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("short payload: got {got} of {want} bytes")]
    Truncated { got: u64, want: u64 },

    #[error("receive failed: {0}")]
    Io(std::io::Error),
}

/// Receive one framed payload into `path` with the given mode.
async fn recv_file(reader: &mut ConnReader, path: &str, mode: u32) -> Result<(), RecvError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(RecvError::Header)?;
    let length = protocol::parse_frame_header(&header).map_err(|_| RecvError::BadMagic)?;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .await
        .map_err(|source| RecvError::Open {
            path: path.to_string(),
            source,
        })?;

    let mut limited = (&mut *reader).take(length);
    let copied = tokio::io::copy(&mut limited, &mut file)
        .await
        .map_err(RecvError::Io)?;
    if copied != length {
        return Err(RecvError::Truncated {
            got: copied,
            want: length,
        });
    }
    file.flush().await.map_err(RecvError::Io)?;
    Ok(())
}

/// `<UploadDir>/<target>.new`, by plain concatenation; absolute targets
/// keep their leading slash under the staging root.
fn staging_path(upload_dir: &str, target: &str) -> String {
    format!("{upload_dir}/{target}.new")
}

fn backup_path(backup_dir: &str, target: &str, timestamp: &str) -> String {
    format!("{backup_dir}/{target}.{timestamp}")
}

/// Local-time mtime as the 14-digit backup suffix.
fn backup_timestamp(mtime: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(mtime)
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Does `file_name` look like `<basename>.<exactly 14 digits>`?
///
/// Only such siblings participate in retention and newest-selection; other
/// files in the backup directory are ignored.
fn is_backup_of(file_name: &str, basename: &str) -> bool {
    file_name
        .strip_prefix(basename)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(|suffix| suffix.len() == 14 && suffix.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Backups of `target` under `backup_dir`, sorted lexicographically
/// (equivalently: chronologically).
fn list_backups(backup_dir: &str, target: &str) -> Vec<String> {
    let container = Path::new(&format!("{backup_dir}/{target}"))
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    let basename = basename_of(target);
    let mut found = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&container) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_backup_of(&name, &basename) {
                found.push(entry.path().display().to_string());
            }
        }
    }
    found.sort();
    found
}

/// Unlink all but the newest `keep` backups of `target`.
fn prune_backups(backup_dir: &str, target: &str, keep: usize) {
    let backups = list_backups(backup_dir, target);
    if backups.len() <= keep {
        return;
    }
    for stale in &backups[..backups.len() - keep] {
        match std::fs::remove_file(stale) {
            Ok(()) => tracing::info!(path = %stale, "pruned old backup"),
            Err(err) => tracing::warn!(path = %stale, error = %err, "backup prune failed"),
        }
    }
}

fn basename_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Copy `src` over `dst`, giving `dst` the supplied permissions.
fn copy_preserving(dst: &str, src: &str, perm: Permissions) -> std::io::Result<()> {
    let mut source = File::open(src)?;
    let mut dest = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dst)?;
    dest.set_permissions(perm)?;
    std::io::copy(&mut source, &mut dest)?;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        let _ = std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o770)
            .create(parent);
    }
}

/// Receive a new version of `args[0]`, back up the old one, swap, restart.
pub(crate) async fn upload(
    args: &[&str],
    reader: &mut ConnReader,
    writer: &mut OwnedWriteHalf,
    ctx: &AdminCtx,
) -> Verdict {
    let target = args[0].trim().to_string();
    let (upload_dir, backup_dir, max_backups, kill_timeout) = {
        let config = ctx.config.lock();
        (
            config.upload_dir.clone(),
            config.backup_dir.clone(),
            config.max_backup_file,
            config.kill_timeout,
        )
    };

    let staging = staging_path(&upload_dir, &target);
    ensure_parent_dir(&staging);
    let mode = std::fs::symlink_metadata(&target)
        .map(|m| m.permissions().mode())
        .unwrap_or(0o660);

    if let Err(err) = recv_file(reader, &staging, mode).await {
        let _ = std::fs::remove_file(&staging);
        tracing::error!(target = %target, error = %err, "upload receive failed");
        send_line(writer, &format!("Receive file:{target} failed for reason:{err}")).await;
        return Verdict::FailClose;
    }

    if let Ok(meta) = std::fs::metadata(&target) {
        let timestamp = meta
            .modified()
            .map(backup_timestamp)
            .unwrap_or_else(|_| backup_timestamp(SystemTime::now()));
        let backup = backup_path(&backup_dir, &target, &timestamp);
        ensure_parent_dir(&backup);
        if let Err(err) = copy_preserving(&backup, &target, meta.permissions()) {
            send_line(
                writer,
                &format!("Failed backup file:{target} for reason:{err}"),
            )
            .await;
            return Verdict::Fail;
        }
        send_line(writer, &format!("Backup file {target} to {backup} success.")).await;
        prune_backups(&backup_dir, &target, max_backups);
    }

    let affected = ctx.table.lookup_by_prefix(&target);
    {
        let mut tracer = ConnTrace::new(writer);
        for record in &affected {
            launcher::kill(record, kill_timeout, &mut tracer).await;
        }
    }

    let renamed = std::fs::rename(&staging, &target);
    match &renamed {
        Ok(()) => {
            send_line(writer, &format!("Update file:{target} success.")).await;
            if !affected.is_empty() {
                // Monitored programs must stay executable after the swap.
                let _ = std::fs::set_permissions(&target, Permissions::from_mode(0o755));
                let mut tracer = ConnTrace::new(writer);
                for record in &affected {
                    launcher::start(record, &mut tracer).await;
                }
            }
            if target == ctx.self_path {
                let mut tracer = ConnTrace::new(writer);
                reexec::graceful_restart(ctx, &mut tracer).await;
            }
        }
        Err(err) => {
            // The staged file is left on disk for post-mortem.
            send_line(
                writer,
                &format!("Failed to rename update file {target} for reason:{err}"),
            )
            .await;
        }
    }

    restore_auto_restart(&affected);
    if renamed.is_ok() {
        Verdict::Success
    } else {
        Verdict::Fail
    }
}

/// Restore a previous version of `args[0]` from the backup catalog.
pub(crate) async fn rollback(
    args: &[&str],
    writer: &mut OwnedWriteHalf,
    ctx: &AdminCtx,
) -> Verdict {
    let target = args[0].trim().to_string();
    let (backup_dir, kill_timeout) = {
        let config = ctx.config.lock();
        (config.backup_dir.clone(), config.kill_timeout)
    };

    let candidate = if let Some(suffix) = args.get(1) {
        let container = Path::new(&format!("{backup_dir}/{target}"))
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        format!("{container}/{}.{suffix}", basename_of(&target))
    } else {
        match list_backups(&backup_dir, &target).pop() {
            Some(newest) => newest,
            None => {
                send_line(
                    writer,
                    &format!("Failed rollback file:{target} because no backup files found."),
                )
                .await;
                return Verdict::Fail;
            }
        }
    };

    let backup_meta = match std::fs::metadata(&candidate) {
        Ok(meta) => meta,
        Err(err) => {
            send_line(
                writer,
                &format!("Failed rollback file:{target} for reason:{err}"),
            )
            .await;
            return Verdict::Fail;
        }
    };

    let affected = ctx.table.lookup_by_prefix(&target);
    {
        let mut tracer = ConnTrace::new(writer);
        for record in &affected {
            launcher::kill(record, kill_timeout, &mut tracer).await;
        }
    }

    let copied = copy_preserving(&target, &candidate, backup_meta.permissions());
    match &copied {
        Ok(()) => {
            send_line(
                writer,
                &format!("Rollback file:{target} from {candidate} success."),
            )
            .await;
            let mut tracer = ConnTrace::new(writer);
            for record in &affected {
                launcher::start(record, &mut tracer).await;
            }
            if target == ctx.self_path {
                reexec::graceful_restart(ctx, &mut tracer).await;
            }
        }
        Err(err) => {
            send_line(
                writer,
                &format!("Rollback file {target} failed for reason:{err}"),
            )
            .await;
        }
    }

    restore_auto_restart(&affected);
    if copied.is_ok() {
        Verdict::Success
    } else {
        Verdict::Fail
    }
}

/// Hand ownership of the affected records back to the health checker.
fn restore_auto_restart(records: &[Arc<ProcessRecord>]) {
    for record in records {
        record.set_auto_restart(true);
    }
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
