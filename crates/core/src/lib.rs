// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pmon-core: configuration model shared by the pmon daemon and engine.

pub mod config;

pub use config::{
    resolve_log_path, split_command, CheckConfig, Config, ConfigError, CrashConfig, MonitorConfig,
};
