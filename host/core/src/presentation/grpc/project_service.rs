// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use tonic::{Request, Response, Status};

use super::auth::request_identity;
use super::server::HostState;
use crate::infrastructure::proto::project_service_server::ProjectService;
use crate::infrastructure::proto::{GetProjectRequest, GetProjectResponse};

/// Read-only view of the current project for authenticated extensions.
pub struct ProjectEndpoint {
    state: Arc<HostState>,
}

impl ProjectEndpoint {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl ProjectService for ProjectEndpoint {
    async fn get(&self, request: Request<GetProjectRequest>) -> Result<Response<GetProjectResponse>, Status> {
        request_identity(&request)?;

        let project = self
            .state
            .project
            .project()
            .ok_or_else(|| Status::failed_precondition("no project is loaded"))?;

        Ok(Response::new(GetProjectResponse {
            project: Some((&project).into()),
        }))
    }
}
