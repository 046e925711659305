// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Registry
//!
//! One registry per provider kind, enforcing at most one active registration
//! per provider key. Insertion hands back a [`RegistrationGuard`]; dropping
//! the guard removes exactly the entry it created, so a stream that ends for
//! any reason frees its key once and never evicts a later registration.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Shared provider lookup between registration streams and host callers

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::capability::ProviderKind;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError<E> {
    #[error("{kind} provider '{key}' is already registered")]
    AlreadyRegistered { kind: ProviderKind, key: String },

    #[error("failed to construct provider: {0}")]
    Construction(E),
}

struct Entry<P: ?Sized> {
    generation: u64,
    provider: Arc<P>,
}

struct Inner<P: ?Sized> {
    kind: ProviderKind,
    entries: Mutex<HashMap<String, Entry<P>>>,
    next_generation: AtomicU64,
}

pub struct ProviderRegistry<P: ?Sized> {
    inner: Arc<Inner<P>>,
}

impl<P: ?Sized> Clone for ProviderRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: ?Sized + Send + Sync> ProviderRegistry<P> {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.inner.kind
    }

    /// Check-then-insert under the registry lock. `build` runs only when the
    /// key is free; if it fails nothing is inserted.
    pub fn try_register<E, F>(
        &self,
        key: &str,
        build: F,
    ) -> Result<RegistrationGuard<P>, RegistryError<E>>
    where
        F: FnOnce() -> Result<Arc<P>, E>,
    {
        let mut entries = self.inner.entries.lock();
        if entries.contains_key(key) {
            return Err(RegistryError::AlreadyRegistered {
                kind: self.inner.kind,
                key: key.to_string(),
            });
        }

        let provider = build().map_err(RegistryError::Construction)?;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key.to_string(),
            Entry {
                generation,
                provider,
            },
        );

        info!(kind = %self.inner.kind, provider_key = %key, "Provider registered");
        Ok(RegistrationGuard {
            key: key.to_string(),
            generation,
            inner: self.inner.clone(),
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<P>> {
        self.inner
            .entries
            .lock()
            .get(key)
            .map(|entry| entry.provider.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns one registry entry for the lifetime of its stream.
pub struct RegistrationGuard<P: ?Sized> {
    key: String,
    generation: u64,
    inner: Arc<Inner<P>>,
}

impl<P: ?Sized> RegistrationGuard<P> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<P: ?Sized> Drop for RegistrationGuard<P> {
    fn drop(&mut self) {
        let mut entries = self.inner.entries.lock();
        if entries
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            entries.remove(&self.key);
            info!(kind = %self.inner.kind, provider_key = %self.key, "Provider registration removed");
        } else {
            debug!(kind = %self.inner.kind, provider_key = %self.key, "Registration already gone");
        }
    }
}
