// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Prompt Lock
//!
//! Process-wide, non-reentrant, cancellable lock serializing interactive
//! console prompts requested by concurrently connected extensions. Waiters are
//! served in FIFO order. The lock is released when the returned
//! [`PromptGuard`] is dropped.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PromptLockError {
    #[error("cancelled while waiting for the console")]
    Cancelled,

    #[error("prompt lock closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct PromptLock {
    slot: Arc<Semaphore>,
}

impl Default for PromptLock {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptLock {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait for the console. A cancelled wait never holds the slot.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<PromptGuard, PromptLockError> {
        if self.slot.available_permits() == 0 {
            debug!("Console busy, waiting for prompt lock");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PromptLockError::Cancelled),
            permit = self.slot.clone().acquire_owned() => permit
                .map(|permit| PromptGuard { _permit: permit })
                .map_err(|_| PromptLockError::Closed),
        }
    }

    pub fn is_held(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

/// Holds the console until dropped.
#[derive(Debug)]
pub struct PromptGuard {
    _permit: OwnedSemaphorePermit,
}
