// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::Arc;

use super::provider_error;
use crate::domain::project::{ServiceConfig, ServiceContext};
use crate::domain::provider::{FrameworkServiceProvider, ProgressReporter, ProviderError};
use crate::infrastructure::broker::MessageBroker;
use crate::infrastructure::proto::framework_service_message::MessageType;
use crate::infrastructure::proto::{
    FrameworkServiceBuildRequest, FrameworkServiceInitializeRequest, FrameworkServiceMessage,
    FrameworkServicePackageRequest,
};

/// Build framework served by an extension, keyed by language.
pub struct RemoteFrameworkService {
    language: String,
    broker: Arc<MessageBroker<FrameworkServiceMessage>>,
}

impl RemoteFrameworkService {
    pub fn new(
        language: impl Into<String>,
        broker: Arc<MessageBroker<FrameworkServiceMessage>>,
    ) -> Self {
        Self {
            language: language.into(),
            broker,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    async fn call(
        &self,
        request: MessageType,
        progress: Option<ProgressReporter>,
    ) -> Result<MessageType, ProviderError> {
        let msg = FrameworkServiceMessage {
            message_type: Some(request),
            ..Default::default()
        };
        self.broker
            .send_and_wait(msg, progress)
            .await
            .map_err(provider_error)?
            .message_type
            .ok_or(ProviderError::UnexpectedResponse {
                expected: "a response payload",
            })
    }
}

#[async_trait]
impl FrameworkServiceProvider for RemoteFrameworkService {
    async fn initialize(&self, service: &ServiceConfig) -> Result<(), ProviderError> {
        let request = MessageType::InitializeRequest(FrameworkServiceInitializeRequest {
            service: Some(service.into()),
        });
        match self.call(request, None).await? {
            MessageType::InitializeResponse(_) => Ok(()),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "initialize_response",
            }),
        }
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        context: &ServiceContext,
        progress: Option<ProgressReporter>,
    ) -> Result<Vec<String>, ProviderError> {
        let request = MessageType::BuildRequest(FrameworkServiceBuildRequest {
            service: Some(service.into()),
            context: Some(context.into()),
        });
        match self.call(request, progress).await? {
            MessageType::BuildResponse(resp) => Ok(resp.artifacts),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "build_response",
            }),
        }
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        context: &ServiceContext,
        progress: Option<ProgressReporter>,
    ) -> Result<Vec<String>, ProviderError> {
        let request = MessageType::PackageRequest(FrameworkServicePackageRequest {
            service: Some(service.into()),
            context: Some(context.into()),
        });
        match self.call(request, progress).await? {
            MessageType::PackageResponse(resp) => Ok(resp.artifacts),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "package_response",
            }),
        }
    }
}
