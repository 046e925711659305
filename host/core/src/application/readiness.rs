// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("extension '{0}' did not report ready in time")]
    Timeout(String),

    #[error("extension '{id}' failed to start: {message}")]
    Failed { id: String, message: String },
}

/// Tracks which extensions have finished subscribing and reported ready.
#[derive(Default)]
pub struct ReadinessBoard {
    states: Mutex<HashMap<String, watch::Sender<ReadyState>>>,
}

impl ReadinessBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, id: &str) -> watch::Sender<ReadyState> {
        self.states
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| watch::channel(ReadyState::Pending).0)
            .clone()
    }

    pub fn mark(&self, id: &str, state: ReadyState) {
        info!(extension_id = %id, ?state, "Extension readiness changed");
        self.sender(id).send_replace(state);
    }

    pub fn state(&self, id: &str) -> ReadyState {
        self.states
            .lock()
            .get(id)
            .map(|tx| tx.borrow().clone())
            .unwrap_or(ReadyState::Pending)
    }

    /// Forget an extension, e.g. after its process exits.
    pub fn reset(&self, id: &str) {
        self.states.lock().remove(id);
    }

    pub async fn wait_ready(&self, id: &str, timeout: Duration) -> Result<(), ReadinessError> {
        let mut rx = self.sender(id).subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|s| *s != ReadyState::Pending)).await;

        match waited {
            Ok(Ok(state)) => match &*state {
                ReadyState::Failed(message) => Err(ReadinessError::Failed {
                    id: id.to_string(),
                    message: message.clone(),
                }),
                _ => Ok(()),
            },
            _ => Err(ReadinessError::Timeout(id.to_string())),
        }
    }
}
