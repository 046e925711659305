// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Host Configuration
//
// Defines the YAML configuration for an extension host process:
// - Server settings (token issuer, token lifetime, readiness timeout, broker buffers)
// - Installed extensions and their declared capabilities
// - The project whose lifecycle events extensions may subscribe to

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::extension::ExtensionIdentity;
use crate::domain::project::ProjectConfig;

pub const DEFAULT_ISSUER: &str = "exthost";
pub const CONFIG_PATH_ENV: &str = "EXTHOST_CONFIG";
const CONFIG_FILE_NAME: &str = "exthost.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// `iss` claim minted into, and required on, every extension token.
    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,

    /// How long `run` waits for a spawned extension to report ready.
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_seconds: u64,

    /// Response slots per outstanding broker request (progress + final).
    #[serde(default = "default_broker_buffer")]
    pub broker_response_buffer: usize,
}

fn default_issuer() -> String {
    DEFAULT_ISSUER.to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_readiness_timeout() -> u64 {
    30
}

fn default_broker_buffer() -> usize {
    50
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            token_ttl_seconds: default_token_ttl(),
            readiness_timeout_seconds: default_readiness_timeout(),
            broker_response_buffer: default_broker_buffer(),
        }
    }
}

impl ServerSettings {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub extensions: Vec<ExtensionIdentity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectConfig>,
}

impl HostConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. EXTHOST_CONFIG environment variable
    /// 2. ./exthost.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from(format!("./{CONFIG_FILE_NAME}"));
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// An explicit path must exist and parse.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!(path = ?path, "Loading host configuration from explicit path");
            Self::from_yaml_file(path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!(path = ?path, "Loading host configuration from discovered path");
            Self::from_yaml_file(path)?
        } else {
            tracing::warn!("No host configuration found. Using empty defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("EXTHOST_TOKEN_TTL_SECONDS") {
            match val.parse::<u64>() {
                Ok(ttl) => {
                    tracing::info!(ttl, "Environment override: EXTHOST_TOKEN_TTL_SECONDS");
                    self.server.token_ttl_seconds = ttl;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for EXTHOST_TOKEN_TTL_SECONDS: '{}'. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.issuer.is_empty() {
            return Err(ConfigError::Invalid("server.issuer cannot be empty".into()));
        }
        if self.server.token_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("server.token_ttl_seconds must be positive".into()));
        }
        if self.server.broker_response_buffer == 0 {
            return Err(ConfigError::Invalid(
                "server.broker_response_buffer must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        for extension in &self.extensions {
            if extension.id.is_empty() {
                return Err(ConfigError::Invalid("extension id cannot be empty".into()));
            }
            if !seen.insert(extension.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate extension id '{}'",
                    extension.id
                )));
            }
        }

        if let Some(project) = &self.project {
            for (key, service) in &project.services {
                if !service.name.is_empty() && &service.name != key {
                    return Err(ConfigError::Invalid(format!(
                        "service '{}' declares mismatched name '{}'",
                        key, service.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Project with service names filled in from their map keys.
    pub fn normalized_project(&self) -> Option<ProjectConfig> {
        self.project.clone().map(|mut project| {
            for (key, service) in project.services.iter_mut() {
                if service.name.is_empty() {
                    service.name = key.clone();
                }
            }
            project
        })
    }
}
