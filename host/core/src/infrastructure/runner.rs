// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Extension Runner
//!
//! Launches an installed extension executable with the host address and its
//! access token in the environment. The child is killed when its handle is
//! dropped so no extension outlives the host.

use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::domain::extension::ExtensionIdentity;

pub const SERVER_ENV: &str = "EXTHOST_SERVER";
pub const ACCESS_TOKEN_ENV: &str = "EXTHOST_ACCESS_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("extension '{0}' has no executable path configured")]
    NoExecutable(String),

    #[error("failed to spawn extension '{id}': {source}")]
    Spawn {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on extension '{id}': {source}")]
    Wait {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExtensionRunner {
    server_address: String,
    inherit_stdio: bool,
}

impl ExtensionRunner {
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            inherit_stdio: true,
        }
    }

    /// Discard the child's stdout/stderr instead of sharing the host terminal.
    pub fn quiet(mut self) -> Self {
        self.inherit_stdio = false;
        self
    }

    pub fn spawn(
        &self,
        extension: &ExtensionIdentity,
        access_token: &str,
    ) -> Result<RunningExtension, RunnerError> {
        let path = extension
            .path
            .as_ref()
            .ok_or_else(|| RunnerError::NoExecutable(extension.id.clone()))?;

        let mut cmd = Command::new(path);
        cmd.args(&extension.args)
            .env(SERVER_ENV, &self.server_address)
            .env(ACCESS_TOKEN_ENV, access_token)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !self.inherit_stdio {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            id: extension.id.clone(),
            source,
        })?;

        info!(
            extension_id = %extension.id,
            path = ?path,
            pid = ?child.id(),
            "Extension process started"
        );

        Ok(RunningExtension {
            id: extension.id.clone(),
            child,
        })
    }
}

/// Handle to a launched extension process.
pub struct RunningExtension {
    id: String,
    child: Child,
}

impl RunningExtension {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn wait(&mut self) -> Result<ExitStatus, RunnerError> {
        self.child.wait().await.map_err(|source| RunnerError::Wait {
            id: self.id.clone(),
            source,
        })
    }

    pub async fn stop(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(extension_id = %self.id, error = %e, "Failed to kill extension process");
        } else {
            info!(extension_id = %self.id, "Extension process stopped");
        }
    }
}
