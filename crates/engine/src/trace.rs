// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress-line sink for supervision operations.
//!
//! Start/kill/update operations narrate what they did, one line at a time.
//! When an admin client triggered the operation the lines are echoed to the
//! connection; background operations (health checker, config reload) go to
//! the daemon log only.

use async_trait::async_trait;

/// Destination for human-readable progress lines.
#[async_trait]
pub trait Trace: Send {
    async fn line(&mut self, msg: &str);
}

/// Trace that writes to the daemon log only.
pub struct LogTrace;

#[async_trait]
impl Trace for LogTrace {
    async fn line(&mut self, msg: &str) {
        tracing::info!("{msg}");
    }
}

/// Trace that collects lines in memory, for tests.
#[derive(Default)]
pub struct BufferTrace {
    pub lines: Vec<String>,
}

#[async_trait]
impl Trace for BufferTrace {
    async fn line(&mut self, msg: &str) {
        self.lines.push(msg.to_string());
    }
}
