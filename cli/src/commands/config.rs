// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use exthost_core::domain::host_config::{HostConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = HostConfig::load_or_default(config_override.as_deref())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./exthost.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Issuer: {}", config.server.issuer);
    println!("  Token lifetime: {}s", config.server.token_ttl_seconds);
    println!("  Readiness timeout: {}s", config.server.readiness_timeout_seconds);
    println!();

    println!("{}", "Extensions:".bold());
    if config.extensions.is_empty() {
        println!("  {}", "(none installed)".dimmed());
    }
    for extension in &config.extensions {
        let version = if extension.version.is_empty() {
            String::new()
        } else {
            format!(" {}", extension.version)
        };
        println!("  {}{}", extension.id.bold(), version);
        let capabilities: Vec<String> = extension
            .capabilities
            .iter()
            .map(|c| c.to_string())
            .collect();
        println!("    Capabilities: {}", capabilities.join(", "));
        match &extension.path {
            Some(path) => println!("    Executable: {}", path.display()),
            None => println!("    Executable: {}", "(not set)".dimmed()),
        }
    }
    println!();

    if let Some(project) = config.normalized_project() {
        println!("{}", "Project:".bold());
        println!("  Name: {}", project.name);
        for (name, service) in &project.services {
            println!("  {} ({} → {})", name.bold(), service.language, service.host);
        }
        println!();
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = HostConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
