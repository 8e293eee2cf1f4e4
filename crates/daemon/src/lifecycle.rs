// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup plumbing and the config watcher.
//!
//! The config file is polled every five seconds; a reload only happens when
//! the mtime advances. Reload errors keep the previous config: the daemon
//! never exits over a transient failure. Listen address changes require a
//! restart; everything else (auth, dirs, monitor list, kill timeout) takes
//! effect on the fly.

use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use pmon_core::Config;
use pmon_engine::{launcher, LogTrace, ProcessTable};

/// Config poll interval.
const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Create the upload/backup/log directories.
pub(crate) fn ensure_dirs(config: &Config) -> std::io::Result<()> {
    for dir in [&config.upload_dir, &config.backup_dir, &config.log_dir] {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o770)
            .create(dir)?;
    }
    Ok(())
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll the config file and rebuild shared state when it changes.
///
/// Records that vanished from the config are killed and deleted; new ones
/// are inserted and picked up by the health checker within a tick.
pub(crate) async fn watch_config(
    path: PathBuf,
    shared: Arc<Mutex<Config>>,
    table: Arc<ProcessTable>,
) {
    let mut last_mtime = mtime_of(&path);
    let mut tick = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tick.tick().await;
        let Some(mtime) = mtime_of(&path) else {
            tracing::error!(path = %path.display(), "config file unreadable");
            continue;
        };
        if Some(mtime) <= last_mtime {
            continue;
        }
        match Config::load(&path) {
            Ok(config) => {
                last_mtime = Some(mtime);
                if let Err(err) = ensure_dirs(&config) {
                    tracing::error!(error = %err, "failed to create configured directories");
                }
                let kill_timeout = config.kill_timeout;
                let removed = {
                    *shared.lock() = config.clone();
                    table.rebuild(&config.monitor, &config.log_dir)
                };
                for record in removed {
                    tracing::info!(
                        command = %record.command_line,
                        "monitor entry removed from config, stopping child"
                    );
                    launcher::kill(&record, kill_timeout, &mut LogTrace).await;
                }
                tracing::info!(path = %path.display(), "config reloaded");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to reload config, keeping previous");
            }
        }
    }
}
