// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Extension Host CLI
//!
//! The `exthost` binary runs the local extension gRPC host.
//!
//! ## Commands
//!
//! - `exthost serve` - Serve until interrupted; extensions are started by hand
//!   with the printed address and a token
//! - `exthost run <extension>` - Serve, launch one installed extension and wait
//!   for it to report ready
//! - `exthost config show|validate` - Configuration management
//!
//! Prompts requested by extensions are answered on this process's terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod console;

use commands::ConfigCommand;

/// Extension Host - serve out-of-process extensions over authenticated gRPC
#[derive(Parser)]
#[command(name = "exthost")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "EXTHOST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "EXTHOST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the extension host until interrupted
    #[command(name = "serve")]
    Serve {
        /// Print a freshly minted access token for this installed extension
        #[arg(long, value_name = "EXTENSION_ID")]
        token_for: Option<String>,
    },

    /// Launch an installed extension against a fresh host
    #[command(name = "run")]
    Run {
        /// Installed extension id
        extension: String,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Serve { token_for }) => {
            commands::serve::execute(cli.config, token_for).await
        }
        Some(Commands::Run { extension }) => commands::run::execute(cli.config, &extension).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
