// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal console backing the prompt RPCs.
//!
//! dialoguer blocks on the terminal, so every prompt runs on the blocking
//! pool. The host's prompt lock already guarantees one prompt at a time.

use async_trait::async_trait;
use dialoguer::{Confirm, Input, Password, Select};
use std::io::IsTerminal;

use exthost_core::domain::console::{Console, ConsoleError};

#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl TerminalConsole {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(err: dialoguer::Error) -> ConsoleError {
    match err {
        dialoguer::Error::IO(e) if e.kind() == std::io::ErrorKind::Interrupted => ConsoleError::Cancelled,
        dialoguer::Error::IO(e) => ConsoleError::Io(e.to_string()),
    }
}

async fn blocking<T, F>(prompt: F) -> Result<T, ConsoleError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ConsoleError> + Send + 'static,
{
    if !std::io::stdin().is_terminal() {
        return Err(ConsoleError::NotInteractive);
    }
    tokio::task::spawn_blocking(prompt)
        .await
        .map_err(|e| ConsoleError::Io(e.to_string()))?
}

#[async_trait]
impl Console for TerminalConsole {
    async fn confirm(&self, message: &str, default: Option<bool>) -> Result<bool, ConsoleError> {
        let message = message.to_string();
        blocking(move || {
            let mut confirm = Confirm::new().with_prompt(message);
            if let Some(default) = default {
                confirm = confirm.default(default);
            }
            confirm
                .interact_opt()
                .map_err(io_error)?
                .ok_or(ConsoleError::Cancelled)
        })
        .await
    }

    async fn prompt(&self, message: &str, default: &str, secret: bool) -> Result<String, ConsoleError> {
        let message = message.to_string();
        let default = default.to_string();
        blocking(move || {
            if secret {
                let value = Password::new()
                    .with_prompt(message)
                    .allow_empty_password(true)
                    .interact()
                    .map_err(io_error)?;
                return Ok(if value.is_empty() { default } else { value });
            }

            let mut input = Input::<String>::new().with_prompt(message).allow_empty(true);
            if !default.is_empty() {
                input = input.default(default);
            }
            input.interact_text().map_err(io_error)
        })
        .await
    }

    async fn select(
        &self,
        message: &str,
        choices: &[String],
        default: Option<usize>,
    ) -> Result<usize, ConsoleError> {
        if choices.is_empty() {
            return Err(ConsoleError::InvalidPrompt("no choices to select from".into()));
        }
        let message = message.to_string();
        let choices = choices.to_vec();
        blocking(move || {
            Select::new()
                .with_prompt(message)
                .items(&choices)
                .default(default.unwrap_or(0))
                .interact_opt()
                .map_err(io_error)?
                .ok_or(ConsoleError::Cancelled)
        })
        .await
    }
}
