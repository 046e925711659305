// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::extension::{ExtensionIdentity, ExtensionLookupError, ExtensionRepository};

/// In-memory catalog of installed extensions, seeded from host configuration.
#[derive(Clone, Default)]
pub struct InMemoryExtensionRepository {
    extensions: Arc<RwLock<HashMap<String, ExtensionIdentity>>>,
}

impl InMemoryExtensionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_extensions(extensions: impl IntoIterator<Item = ExtensionIdentity>) -> Self {
        let repo = Self::new();
        for extension in extensions {
            repo.install(extension);
        }
        repo
    }

    /// Insert or replace an extension record.
    pub fn install(&self, extension: ExtensionIdentity) {
        self.extensions.write().insert(extension.id.clone(), extension);
    }

    pub fn uninstall(&self, id: &str) -> Option<ExtensionIdentity> {
        self.extensions.write().remove(id)
    }
}

impl ExtensionRepository for InMemoryExtensionRepository {
    fn get_installed(&self, id: &str) -> Result<ExtensionIdentity, ExtensionLookupError> {
        self.extensions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ExtensionLookupError::NotInstalled(id.to_string()))
    }

    fn list_installed(&self) -> Vec<ExtensionIdentity> {
        let mut all: Vec<_> = self.extensions.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
