// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the exthost CLI

pub mod config;
pub mod run;
pub mod serve;

pub use self::config::ConfigCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use exthost_core::domain::host_config::HostConfig;
use exthost_core::ExtensionHost;

use crate::console::TerminalConsole;

/// Load and validate the host configuration.
pub(crate) fn load_config(config_path: Option<PathBuf>) -> Result<HostConfig> {
    let config =
        HostConfig::load_or_default(config_path.as_deref()).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

pub(crate) fn build_host(config: &HostConfig) -> ExtensionHost {
    ExtensionHost::from_config(config, Arc::new(TerminalConsole::new()))
}
