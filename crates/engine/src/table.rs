// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrency-safe registry of monitored processes.
//!
//! Keyed by the full configured command line. The table mutex is held only
//! for map operations; spawning, killing and I/O happen against the
//! per-record guard so one slow child never blocks lookups.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pmon_core::{resolve_log_path, split_command, MonitorConfig};

use crate::record::ProcessRecord;

#[derive(Default)]
pub struct ProcessTable {
    inner: Mutex<HashMap<String, Arc<ProcessRecord>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record or refresh an existing one in place.
    ///
    /// Existing records keep their guard, running child and runtime flags;
    /// only the config-derived fields are updated. Returns `None` for a
    /// blank `Proc` entry.
    pub fn register_or_update(
        &self,
        cfg: &MonitorConfig,
        log_dir: &str,
    ) -> Option<Arc<ProcessRecord>> {
        let (program, args) = split_command(&cfg.proc)?;
        let record = {
            let mut map = self.inner.lock();
            Arc::clone(map.entry(cfg.proc.clone()).or_insert_with(|| {
                Arc::new(ProcessRecord::new(cfg.proc.clone(), program.clone(), args))
            }))
        };
        record.refresh_config(
            cfg.env.clone(),
            resolve_log_path(&cfg.log_file, &program, log_dir),
            log_dir.into(),
            cfg.check.clone(),
            cfg.crash.clone(),
        );
        Some(record)
    }

    /// Rebuild membership from a freshly loaded config.
    ///
    /// Entries that vanished from the config are removed from the table and
    /// returned so the caller can kill them outside the table mutex.
    pub fn rebuild(
        &self,
        monitors: &[MonitorConfig],
        log_dir: &str,
    ) -> Vec<Arc<ProcessRecord>> {
        for cfg in monitors {
            self.register_or_update(cfg, log_dir);
        }
        let keep: Vec<&str> = monitors.iter().map(|m| m.proc.as_str()).collect();
        let mut map = self.inner.lock();
        let stale: Vec<String> = map
            .keys()
            .filter(|k| !keep.contains(&k.as_str()))
            .cloned()
            .collect();
        stale
            .into_iter()
            .filter_map(|k| map.remove(&k))
            .collect()
    }

    pub fn lookup_exact(&self, command_line: &str) -> Option<Arc<ProcessRecord>> {
        self.inner.lock().get(command_line).map(Arc::clone)
    }

    /// All records whose command line starts with `prefix`, sorted by key.
    ///
    /// Admin commands and the update pipeline address children this way, so
    /// an operator can name a child by program path instead of the full
    /// command line. The match is a plain string prefix and can catch more
    /// than intended; that is the documented contract.
    pub fn lookup_by_prefix(&self, prefix: &str) -> Vec<Arc<ProcessRecord>> {
        let mut records: Vec<Arc<ProcessRecord>> = self
            .inner
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| Arc::clone(v))
            .collect();
        records.sort_by(|a, b| a.command_line.cmp(&b.command_line));
        records
    }

    /// Copy of all records, sorted by key, for iteration without the table
    /// mutex.
    pub fn snapshot(&self) -> Vec<Arc<ProcessRecord>> {
        let mut records: Vec<Arc<ProcessRecord>> =
            self.inner.lock().values().map(Arc::clone).collect();
        records.sort_by(|a, b| a.command_line.cmp(&b.command_line));
        records
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
