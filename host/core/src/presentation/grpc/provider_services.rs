// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provider registration streams: service targets, framework services and
//! provisioning providers. Each one hands its inbound stream to the shared
//! registration handshake and returns the outbound half.

use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use super::auth::request_identity;
use super::server::HostState;
use crate::infrastructure::proto::framework_service_server::FrameworkService;
use crate::infrastructure::proto::provisioning_service_server::ProvisioningService;
use crate::infrastructure::proto::service_target_service_server::ServiceTargetService;
use crate::infrastructure::proto::{FrameworkServiceMessage, ProvisioningMessage, ServiceTargetMessage};

pub struct ServiceTargetEndpoint {
    state: Arc<HostState>,
}

impl ServiceTargetEndpoint {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl ServiceTargetService for ServiceTargetEndpoint {
    type StreamStream = ReceiverStream<Result<ServiceTargetMessage, Status>>;

    async fn stream(
        &self,
        request: Request<Streaming<ServiceTargetMessage>>,
    ) -> Result<Response<Self::StreamStream>, Status> {
        let identity = request_identity(&request)?;
        let rx = self.state.registration.open_provider_stream(
            &identity,
            self.state.service_targets.clone(),
            self.state.factories.service_target.clone(),
            request.into_inner(),
        )?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

pub struct FrameworkServiceEndpoint {
    state: Arc<HostState>,
}

impl FrameworkServiceEndpoint {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl FrameworkService for FrameworkServiceEndpoint {
    type StreamStream = ReceiverStream<Result<FrameworkServiceMessage, Status>>;

    async fn stream(
        &self,
        request: Request<Streaming<FrameworkServiceMessage>>,
    ) -> Result<Response<Self::StreamStream>, Status> {
        let identity = request_identity(&request)?;
        let rx = self.state.registration.open_provider_stream(
            &identity,
            self.state.framework_services.clone(),
            self.state.factories.framework_service.clone(),
            request.into_inner(),
        )?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

pub struct ProvisioningEndpoint {
    state: Arc<HostState>,
}

impl ProvisioningEndpoint {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl ProvisioningService for ProvisioningEndpoint {
    type StreamStream = ReceiverStream<Result<ProvisioningMessage, Status>>;

    async fn stream(
        &self,
        request: Request<Streaming<ProvisioningMessage>>,
    ) -> Result<Response<Self::StreamStream>, Status> {
        let identity = request_identity(&request)?;
        let rx = self.state.registration.open_provider_stream(
            &identity,
            self.state.provisioning_providers.clone(),
            self.state.factories.provisioning.clone(),
            request.into_inner(),
        )?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
