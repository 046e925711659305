// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `exthost run <extension>`
//!
//! Starts a host, launches the extension with the host address and a freshly
//! minted token, waits for its ready signal and then serves it until the
//! process exits or the user interrupts.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{build_host, load_config};

pub async fn execute(config_path: Option<PathBuf>, extension_id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let host = build_host(&config)
        .start()
        .await
        .context("Failed to start extension host")?;

    let mut child = host
        .spawn_extension(extension_id)
        .with_context(|| format!("Failed to launch extension '{extension_id}'"))?;
    println!(
        "Launched {} (pid {})",
        extension_id.bold(),
        child
            .pid()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "?".to_string())
    );

    let ready = tokio::select! {
        ready = host.wait_ready(extension_id) => ready.map_err(anyhow::Error::from),
        status = child.wait() => match status {
            Ok(status) => Err(anyhow::anyhow!("extension exited before it was ready ({status})")),
            Err(e) => Err(e.into()),
        },
    };
    if let Err(e) = ready {
        child.stop().await;
        host.shutdown().await.ok();
        return Err(e).with_context(|| format!("Extension '{extension_id}' did not become ready"));
    }

    println!("{}", format!("✓ {extension_id} is ready").green());
    println!("{}", "Press Ctrl+C to stop.".dimmed());

    let exit = tokio::select! {
        status = child.wait() => Some(status?),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!(extension_id = %extension_id, "Interrupt received");
            None
        }
    };

    if exit.is_none() {
        child.stop().await;
    }
    host.shutdown().await.context("Extension host did not shut down cleanly")?;

    match exit {
        Some(status) if !status.success() => {
            warn!(extension_id = %extension_id, %status, "Extension exited with failure");
            bail!("extension '{extension_id}' exited with {status}")
        }
        Some(_) => println!("{}", format!("✓ {extension_id} exited").green()),
        None => println!("{}", "✓ Extension host stopped".green()),
    }
    Ok(())
}
