// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::provider_error;
use crate::domain::provider::{
    ProgressReporter, ProviderError, ProvisionOutputs, ProvisioningProvider,
};
use crate::infrastructure::broker::MessageBroker;
use crate::infrastructure::proto::provisioning_message::MessageType;
use crate::infrastructure::proto::{
    ProvisioningDeployRequest, ProvisioningDestroyRequest, ProvisioningInitializeRequest,
    ProvisioningMessage,
};

/// Provisioning engine served by an extension, keyed by provider name.
pub struct RemoteProvisioningProvider {
    name: String,
    broker: Arc<MessageBroker<ProvisioningMessage>>,
}

impl RemoteProvisioningProvider {
    pub fn new(name: impl Into<String>, broker: Arc<MessageBroker<ProvisioningMessage>>) -> Self {
        Self {
            name: name.into(),
            broker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        request: MessageType,
        progress: Option<ProgressReporter>,
    ) -> Result<MessageType, ProviderError> {
        let msg = ProvisioningMessage {
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
impl ProvisioningProvider for RemoteProvisioningProvider {
    async fn initialize(
        &self,
        project_path: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError> {
        let request = MessageType::InitializeRequest(ProvisioningInitializeRequest {
            project_path: project_path.to_string(),
            options: options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });
        match self.call(request, None).await? {
            MessageType::InitializeResponse(_) => Ok(()),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "initialize_response",
            }),
        }
    }

    async fn deploy(
        &self,
        environment: &str,
        progress: Option<ProgressReporter>,
    ) -> Result<ProvisionOutputs, ProviderError> {
        let request = MessageType::DeployRequest(ProvisioningDeployRequest {
            environment: environment.to_string(),
        });
        match self.call(request, progress).await? {
            MessageType::DeployResponse(resp) => Ok(ProvisionOutputs {
                outputs: resp.outputs.into_iter().collect(),
            }),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "deploy_response",
            }),
        }
    }

    async fn destroy(&self, environment: &str, purge: bool) -> Result<Vec<String>, ProviderError> {
        let request = MessageType::DestroyRequest(ProvisioningDestroyRequest {
            environment: environment.to_string(),
            purge,
        });
        match self.call(request, None).await? {
            MessageType::DestroyResponse(resp) => Ok(resp.invalidated_outputs),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "destroy_response",
            }),
        }
    }
}
