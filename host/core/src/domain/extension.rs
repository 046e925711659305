// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Extension Identity
//!
//! The installed-extension record the host resolves from the authenticated
//! token subject. It is read-only for the lifetime of an RPC session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::domain::capability::CapabilityKind;

/// Installed extension as known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionIdentity {
    /// Dot-separated unique identifier, e.g. `contoso.containerapp`.
    pub id: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub capabilities: BTreeSet<CapabilityKind>,

    /// Executable launched by `ExtensionRunner`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ExtensionIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            namespace: String::new(),
            version: String::new(),
            capabilities: BTreeSet::new(),
            path: None,
            args: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: CapabilityKind) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn has_capability(&self, capability: CapabilityKind) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExtensionLookupError {
    #[error("extension '{0}' is not installed")]
    NotInstalled(String),
}

/// Lookup of installed extensions keyed by the authenticated subject.
pub trait ExtensionRepository: Send + Sync {
    fn get_installed(&self, id: &str) -> Result<ExtensionIdentity, ExtensionLookupError>;

    fn list_installed(&self) -> Vec<ExtensionIdentity>;
}
