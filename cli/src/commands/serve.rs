// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `exthost serve`

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use exthost_core::infrastructure::runner::{ACCESS_TOKEN_ENV, SERVER_ENV};

use super::{build_host, load_config};

pub async fn execute(config_path: Option<PathBuf>, token_for: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let host = build_host(&config)
        .start()
        .await
        .context("Failed to start extension host")?;

    let address = host.server_info().address.clone();
    println!("{}", "✓ Extension host listening".green());
    println!("  {}={}", SERVER_ENV, address.bold());

    if let Some(extension_id) = token_for {
        let token = host
            .mint_token_for(&extension_id)
            .with_context(|| format!("Failed to mint token for '{extension_id}'"))?;
        println!("  {}={}", ACCESS_TOKEN_ENV, token);
    }

    println!("{}", "Press Ctrl+C to stop.".dimmed());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!(address = %address, "Interrupt received");

    host.shutdown().await.context("Extension host did not shut down cleanly")?;
    println!("{}", "✓ Extension host stopped".green());
    Ok(())
}
