// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console prompts requested by extensions. Every call holds the prompt lock
//! for the duration of the console interaction so concurrent extensions never
//! interleave terminal output.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::debug;

use super::auth::request_identity;
use super::server::HostState;
use crate::domain::console::ConsoleError;
use crate::infrastructure::prompt_lock::{PromptGuard, PromptLockError};
use crate::infrastructure::proto::prompt_service_server::PromptService;
use crate::infrastructure::proto::{
    ConfirmRequest, ConfirmResponse, PromptRequest, PromptResponse, SelectRequest, SelectResponse,
};

pub struct PromptEndpoint {
    state: Arc<HostState>,
}

impl PromptEndpoint {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }

    async fn lock_console(&self, extension_id: &str) -> Result<PromptGuard, Status> {
        if self.state.prompt_lock.is_held() {
            debug!(extension_id = %extension_id, "Prompt lock contended");
        }
        self.state
            .prompt_lock
            .acquire(self.state.registration.shutdown_token())
            .await
            .map_err(|e| match e {
                PromptLockError::Cancelled => Status::cancelled(e.to_string()),
                PromptLockError::Closed => Status::unavailable(e.to_string()),
            })
    }
}

fn console_status(err: ConsoleError) -> Status {
    match err {
        ConsoleError::Cancelled => Status::cancelled(err.to_string()),
        ConsoleError::NotInteractive => Status::failed_precondition(err.to_string()),
        ConsoleError::InvalidPrompt(_) => Status::invalid_argument(err.to_string()),
        ConsoleError::Io(_) => Status::internal(err.to_string()),
    }
}

#[tonic::async_trait]
impl PromptService for PromptEndpoint {
    async fn confirm(&self, request: Request<ConfirmRequest>) -> Result<Response<ConfirmResponse>, Status> {
        let identity = request_identity(&request)?;
        let req = request.into_inner();

        let _guard = self.lock_console(identity.extension_id()).await?;
        let value = self
            .state
            .console
            .confirm(&req.message, req.default_value)
            .await
            .map_err(console_status)?;

        Ok(Response::new(ConfirmResponse { value }))
    }

    async fn prompt(&self, request: Request<PromptRequest>) -> Result<Response<PromptResponse>, Status> {
        let identity = request_identity(&request)?;
        let req = request.into_inner();

        let _guard = self.lock_console(identity.extension_id()).await?;
        let value = self
            .state
            .console
            .prompt(&req.message, &req.default_value, req.secret)
            .await
            .map_err(console_status)?;

        Ok(Response::new(PromptResponse { value }))
    }

    async fn select(&self, request: Request<SelectRequest>) -> Result<Response<SelectResponse>, Status> {
        let identity = request_identity(&request)?;
        let req = request.into_inner();

        if req.choices.is_empty() {
            return Err(Status::invalid_argument("select requires at least one choice"));
        }
        let default = req.default_index.map(|i| i as usize);
        if let Some(index) = default {
            if index >= req.choices.len() {
                return Err(Status::invalid_argument(format!(
                    "default index {index} out of range for {} choices",
                    req.choices.len()
                )));
            }
        }

        let _guard = self.lock_console(identity.extension_id()).await?;
        let index = self
            .state
            .console
            .select(&req.message, &req.choices, default)
            .await
            .map_err(console_status)?;

        Ok(Response::new(SelectResponse { index: index as u32 }))
    }
}
