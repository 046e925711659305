// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::Arc;

use super::provider_error;
use crate::domain::project::{ServiceConfig, ServiceContext, TargetResource};
use crate::domain::provider::{DeployResult, ProgressReporter, ProviderError, ServiceTargetProvider};
use crate::infrastructure::broker::MessageBroker;
use crate::infrastructure::proto::service_target_message::MessageType;
use crate::infrastructure::proto::{
    ServiceTargetDeployRequest, ServiceTargetEndpointsRequest, ServiceTargetInitializeRequest,
    ServiceTargetMessage,
};

/// Service target served by an extension over its registered stream.
pub struct RemoteServiceTarget {
    host: String,
    broker: Arc<MessageBroker<ServiceTargetMessage>>,
}

impl RemoteServiceTarget {
    pub fn new(host: impl Into<String>, broker: Arc<MessageBroker<ServiceTargetMessage>>) -> Self {
        Self {
            host: host.into(),
            broker,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn call(
        &self,
        request: MessageType,
        progress: Option<ProgressReporter>,
    ) -> Result<MessageType, ProviderError> {
        let msg = ServiceTargetMessage {
            message_type: Some(request),
            ..Default::default()
        };
        let reply = self
            .broker
            .send_and_wait(msg, progress)
            .await
            .map_err(provider_error)?;
        reply.message_type.ok_or(ProviderError::UnexpectedResponse {
            expected: "a response payload",
        })
    }
}

#[async_trait]
impl ServiceTargetProvider for RemoteServiceTarget {
    async fn initialize(&self, service: &ServiceConfig) -> Result<(), ProviderError> {
        let request = MessageType::InitializeRequest(ServiceTargetInitializeRequest {
            service: Some(service.into()),
        });
        match self.call(request, None).await? {
            MessageType::InitializeResponse(_) => Ok(()),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "initialize_response",
            }),
        }
    }

    async fn endpoints(
        &self,
        service: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>, ProviderError> {
        let request = MessageType::EndpointsRequest(ServiceTargetEndpointsRequest {
            service: Some(service.into()),
            target: Some(target.into()),
        });
        match self.call(request, None).await? {
            MessageType::EndpointsResponse(resp) => Ok(resp.endpoints),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "endpoints_response",
            }),
        }
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        context: &ServiceContext,
        target: &TargetResource,
        progress: Option<ProgressReporter>,
    ) -> Result<DeployResult, ProviderError> {
        let request = MessageType::DeployRequest(ServiceTargetDeployRequest {
            service: Some(service.into()),
            context: Some(context.into()),
            target: Some(target.into()),
        });
        match self.call(request, progress).await? {
            MessageType::DeployResponse(resp) => Ok(DeployResult {
                deployment_id: resp.deployment_id,
                endpoints: resp.endpoints,
            }),
            _ => Err(ProviderError::UnexpectedResponse {
                expected: "deploy_response",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::broker::Envelope;
    use crate::infrastructure::proto::ServiceTargetDeployResponse;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_deploy_forwards_over_stream() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (in_tx, in_rx) = mpsc::channel(8);
        let broker = Arc::new(MessageBroker::new("service_target:containerapp", out_tx));
        {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .run(ReceiverStream::new(in_rx), CancellationToken::new())
                    .await
            });
        }

        let adapter = RemoteServiceTarget::new("containerapp", broker);
        let call = tokio::spawn(async move {
            adapter
                .deploy(
                    &ServiceConfig::default(),
                    &ServiceContext::default(),
                    &TargetResource::default(),
                    None,
                )
                .await
        });

        let request = out_rx.recv().await.unwrap().unwrap();
        assert_eq!(request.kind(), "deploy_request");

        in_tx
            .send(Ok(ServiceTargetMessage {
                request_id: request.request_id.clone(),
                error: None,
                message_type: Some(MessageType::DeployResponse(ServiceTargetDeployResponse {
                    deployment_id: "dep-1".into(),
                    endpoints: vec!["https://api.example".into()],
                })),
            }))
            .await
            .unwrap();

        let result = call.await.unwrap().unwrap();
        assert_eq!(result.deployment_id, "dep-1");
        assert_eq!(result.endpoints, vec!["https://api.example".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_stream_is_disconnected() {
        let (out_tx, out_rx) = mpsc::channel(8);
        drop(out_rx);
        let broker = Arc::new(MessageBroker::<ServiceTargetMessage>::new("closed", out_tx));

        let adapter = RemoteServiceTarget::new("containerapp", broker);
        assert_eq!(
            adapter.initialize(&ServiceConfig::default()).await,
            Err(ProviderError::Disconnected)
        );
    }
}
