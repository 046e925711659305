// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Console
//!
//! Interactive terminal the host owns. Extensions reach it only through the
//! prompt RPCs, which serialize access with the process-wide prompt lock.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("console is not interactive")]
    NotInteractive,

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("console I/O failed: {0}")]
    Io(String),
}

#[async_trait]
pub trait Console: Send + Sync {
    async fn confirm(&self, message: &str, default: Option<bool>) -> Result<bool, ConsoleError>;

    async fn prompt(&self, message: &str, default: &str, secret: bool) -> Result<String, ConsoleError>;

    async fn select(
        &self,
        message: &str,
        choices: &[String],
        default: Option<usize>,
    ) -> Result<usize, ConsoleError>;
}
