// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor configuration file model.
//!
//! The config file is JSON with PascalCase keys and is re-read by the daemon
//! every five seconds when its mtime advances. Missing directories get
//! conservative defaults relative to the daemon's working directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors from loading or parsing the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// TCP liveness probe for one monitored process. Disabled when `addr` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// `host:port` the child is expected to be listening on.
    #[serde(rename = "Addr")]
    pub addr: String,
    /// Seconds between probes.
    #[serde(rename = "Period")]
    pub period: u64,
    /// Connect deadline in seconds; `0` means no deadline.
    #[serde(rename = "Timeout")]
    pub timeout: u64,
}

/// Crash-output capture for one monitored process.
///
/// When a stdout/stderr write begins with `prefix`, the remainder of the
/// child's output is captured in memory and dumped after the child exits;
/// `command` then runs with `${CrashContent}` and `${HOSTNAME}` substituted
/// into each argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "Command")]
    pub command: Vec<String>,
}

/// One entry of the `Monitor` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Full invocation: program plus arguments, whitespace-separated.
    /// This string is also the process table key.
    #[serde(rename = "Proc")]
    pub proc: String,
    /// Child output log; empty means `<LogDir>/<basename(program)>.out`.
    #[serde(rename = "LogFile")]
    pub log_file: String,
    /// Extra `KEY=VALUE` entries appended to the inherited environment.
    #[serde(rename = "Env")]
    pub env: Vec<String>,
    #[serde(rename = "Check")]
    pub check: CheckConfig,
    #[serde(rename = "Crash")]
    pub crash: CrashConfig,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Admin listener address, `host:port`.
    #[serde(rename = "Listen")]
    pub listen: String,
    /// Shared admin token; empty disables authentication.
    #[serde(rename = "Auth")]
    pub auth: String,
    #[serde(rename = "BackupDir")]
    pub backup_dir: String,
    #[serde(rename = "UploadDir")]
    pub upload_dir: String,
    #[serde(rename = "LogDir")]
    pub log_dir: String,
    /// Newest backups retained per target file.
    #[serde(rename = "MaxBackupFile")]
    pub max_backup_file: usize,
    /// Seconds to wait for a killed child to be reaped before giving up.
    /// `0` waits forever (the historical behavior).
    #[serde(rename = "KillTimeout")]
    pub kill_timeout: u64,
    #[serde(rename = "Monitor")]
    pub monitor: Vec<MonitorConfig>,
}

impl Config {
    /// Load and normalize a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = serde_json::from_slice(&data)?;
        config.normalize();
        Ok(config)
    }

    /// Fill in defaults for fields the file left empty.
    pub fn normalize(&mut self) {
        if self.upload_dir.is_empty() {
            self.upload_dir = "./upload".to_string();
        }
        if self.backup_dir.is_empty() {
            self.backup_dir = "./backup".to_string();
        }
        if self.log_dir.is_empty() {
            self.log_dir = "./logs".to_string();
        }
        if self.max_backup_file == 0 {
            self.max_backup_file = 10;
        }
    }
}

/// Split a configured `Proc` string into program and arguments.
///
/// Returns `None` for a blank string; such entries are skipped when the
/// process table is rebuilt.
pub fn split_command(line: &str) -> Option<(String, Vec<String>)> {
    let mut fields = line.split_whitespace();
    let program = fields.next()?.to_string();
    Some((program, fields.map(str::to_string).collect()))
}

/// Resolve the effective log path for a monitored process.
///
/// An empty `log_file` defaults to `<basename(program)>.out`; relative paths
/// land under `log_dir`.
pub fn resolve_log_path(log_file: &str, program: &str, log_dir: &str) -> PathBuf {
    let name = if log_file.is_empty() {
        let base = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());
        format!("{base}.out")
    } else {
        log_file.to_string()
    };
    if name.starts_with('/') {
        PathBuf::from(name)
    } else {
        Path::new(log_dir).join(name)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
