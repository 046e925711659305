// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Provider Sessions
//!
//! Extension half of the registration handshake. A session opens the
//! provider stream, sends the registration request as the first message,
//! waits for the host's acknowledgement and then serves host requests through
//! the same [`MessageBroker`] the host uses on its side.
//!
//! Requests are answered by a domain provider implementation, so an extension
//! implements [`ServiceTargetProvider`] (or one of the other provider traits)
//! exactly as the host consumes it.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::{Response, Status, Streaming};
use tracing::info;
use uuid::Uuid;

use crate::client::ExtensionClient;
use crate::error::SdkError;
use exthost_core::domain::project::{ServiceConfig, ServiceContext, TargetResource};
use exthost_core::domain::provider::{FrameworkServiceProvider, ProvisioningProvider, ServiceTargetProvider};
use exthost_core::infrastructure::broker::{BrokerError, Envelope, MessageBroker};
use exthost_core::infrastructure::envelopes::ProviderEnvelope;
use exthost_core::infrastructure::proto::{
    framework_service_message, provisioning_message, service_target_message, FrameworkServiceBuildResponse,
    FrameworkServiceInitializeResponse, FrameworkServiceMessage, FrameworkServicePackageResponse,
    ProvisioningDeployResponse, ProvisioningDestroyResponse, ProvisioningInitializeResponse,
    ProvisioningMessage, ServiceTargetDeployResponse, ServiceTargetEndpointsResponse,
    ServiceTargetInitializeResponse, ServiceTargetMessage,
};

const STREAM_BUFFER: usize = 32;
const REGISTER_RESPONSE: &str = "register_response";

/// Request half of a provider stream.
pub type OutboundStream<M> = BoxStream<'static, M>;

/// A registered provider stream, ready to serve host requests.
pub struct ProviderSession<M: ProviderEnvelope> {
    key: String,
    broker: Arc<MessageBroker<M>>,
    inbound: Streaming<M>,
}

impl<M: ProviderEnvelope> ProviderSession<M> {
    /// Send the registration request over a stream opened by `open` and wait
    /// for the host to accept it.
    pub async fn register<F, Fut>(key: &str, open: F) -> Result<Self, SdkError>
    where
        F: FnOnce(OutboundStream<M>) -> Fut,
        Fut: Future<Output = Result<Response<Streaming<M>>, Status>>,
    {
        let (tx, rx) = mpsc::channel::<Result<M, Status>>(STREAM_BUFFER);

        let mut request = M::registration_request(key);
        request.set_request_id(&Uuid::new_v4().to_string());
        tx.send(Ok(request)).await.map_err(|_| SdkError::Closed)?;

        let outbound: OutboundStream<M> = Box::pin(ReceiverStream::new(rx).filter_map(Result::ok));
        let mut inbound = open(outbound).await?.into_inner();

        match inbound.message().await {
            Ok(Some(ack)) if ack.kind() == REGISTER_RESPONSE => {}
            Ok(Some(other)) => return Err(SdkError::UnexpectedMessage(other.kind())),
            Ok(None) => return Err(SdkError::Closed),
            Err(status) => {
                return Err(SdkError::RegistrationRejected {
                    kind: M::KIND,
                    key: key.to_string(),
                    status,
                })
            }
        }

        info!(kind = %M::KIND, provider_key = %key, "Provider registered with host");
        Ok(Self {
            key: key.to_string(),
            broker: Arc::new(MessageBroker::new(format!("{}:{key}", M::KIND), tx)),
            inbound,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn broker(&self) -> &Arc<MessageBroker<M>> {
        &self.broker
    }

    /// Serve host requests until the host closes the stream or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SdkError> {
        let result = self.broker.run(self.inbound, cancel).await;
        info!(kind = %M::KIND, provider_key = %self.key, "Provider session ended");
        match result {
            Ok(()) | Err(BrokerError::Cancelled) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn service_of(service: Option<exthost_core::infrastructure::proto::ServiceConfig>) -> ServiceConfig {
    service.map(ServiceConfig::from).unwrap_or_default()
}

fn context_of(context: Option<exthost_core::infrastructure::proto::ServiceContext>) -> ServiceContext {
    context.map(ServiceContext::from).unwrap_or_default()
}

impl ExtensionClient {
    /// Register `provider` as the service target for `host`.
    pub async fn serve_service_target(
        &self,
        host: &str,
        provider: Arc<dyn ServiceTargetProvider>,
    ) -> Result<ProviderSession<ServiceTargetMessage>, SdkError> {
        use service_target_message::MessageType;

        let mut client = self.service_targets();
        let session = ProviderSession::register(host, move |outbound| async move {
            let fut: BoxFuture<'_, _> = Box::pin(client.stream(outbound));
            fut.await
        })
        .await?;
        let reply = |message_type| ServiceTargetMessage {
            message_type: Some(message_type),
            ..Default::default()
        };

        let p = provider.clone();
        session.broker.on("initialize_request", move |_ctx, msg: ServiceTargetMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::InitializeRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected initialize_request");
                };
                p.initialize(&service_of(req.service)).await?;
                Ok(Some(reply(MessageType::InitializeResponse(ServiceTargetInitializeResponse {}))))
            }
        })?;

        let p = provider.clone();
        session.broker.on("endpoints_request", move |_ctx, msg: ServiceTargetMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::EndpointsRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected endpoints_request");
                };
                let target = req.target.map(TargetResource::from).unwrap_or_default();
                let endpoints = p.endpoints(&service_of(req.service), &target).await?;
                Ok(Some(reply(MessageType::EndpointsResponse(ServiceTargetEndpointsResponse {
                    endpoints,
                }))))
            }
        })?;

        let p = provider;
        session.broker.on("deploy_request", move |ctx, msg: ServiceTargetMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::DeployRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected deploy_request");
                };
                let target = req.target.map(TargetResource::from).unwrap_or_default();
                let result = p
                    .deploy(
                        &service_of(req.service),
                        &context_of(req.context),
                        &target,
                        Some(ctx.progress_reporter()),
                    )
                    .await?;
                Ok(Some(reply(MessageType::DeployResponse(ServiceTargetDeployResponse {
                    deployment_id: result.deployment_id,
                    endpoints: result.endpoints,
                }))))
            }
        })?;

        Ok(session)
    }

    /// Register `provider` as the framework service for `language`.
    pub async fn serve_framework_service(
        &self,
        language: &str,
        provider: Arc<dyn FrameworkServiceProvider>,
    ) -> Result<ProviderSession<FrameworkServiceMessage>, SdkError> {
        use framework_service_message::MessageType;

        let mut client = self.framework_services();
        let session = ProviderSession::register(language, move |outbound| async move {
            let fut: BoxFuture<'_, _> = Box::pin(client.stream(outbound));
            fut.await
        })
        .await?;
        let reply = |message_type| FrameworkServiceMessage {
            message_type: Some(message_type),
            ..Default::default()
        };

        let p = provider.clone();
        session.broker.on("initialize_request", move |_ctx, msg: FrameworkServiceMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::InitializeRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected initialize_request");
                };
                p.initialize(&service_of(req.service)).await?;
                Ok(Some(reply(MessageType::InitializeResponse(FrameworkServiceInitializeResponse {}))))
            }
        })?;

        let p = provider.clone();
        session.broker.on("build_request", move |ctx, msg: FrameworkServiceMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::BuildRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected build_request");
                };
                let artifacts = p
                    .build(
                        &service_of(req.service),
                        &context_of(req.context),
                        Some(ctx.progress_reporter()),
                    )
                    .await?;
                Ok(Some(reply(MessageType::BuildResponse(FrameworkServiceBuildResponse { artifacts }))))
            }
        })?;

        let p = provider;
        session.broker.on("package_request", move |ctx, msg: FrameworkServiceMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::PackageRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected package_request");
                };
                let artifacts = p
                    .package(
                        &service_of(req.service),
                        &context_of(req.context),
                        Some(ctx.progress_reporter()),
                    )
                    .await?;
                Ok(Some(reply(MessageType::PackageResponse(FrameworkServicePackageResponse {
                    artifacts,
                }))))
            }
        })?;

        Ok(session)
    }

    /// Register `provider` as the provisioning provider called `name`.
    pub async fn serve_provisioning(
        &self,
        name: &str,
        provider: Arc<dyn ProvisioningProvider>,
    ) -> Result<ProviderSession<ProvisioningMessage>, SdkError> {
        use provisioning_message::MessageType;

        let mut client = self.provisioning();
        let session = ProviderSession::register(name, move |outbound| async move {
            let fut: BoxFuture<'_, _> = Box::pin(client.stream(outbound));
            fut.await
        })
        .await?;
        let reply = |message_type| ProvisioningMessage {
            message_type: Some(message_type),
            ..Default::default()
        };

        let p = provider.clone();
        session.broker.on("initialize_request", move |_ctx, msg: ProvisioningMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::InitializeRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected initialize_request");
                };
                let options: BTreeMap<String, String> = req.options.into_iter().collect();
                p.initialize(&req.project_path, &options).await?;
                Ok(Some(reply(MessageType::InitializeResponse(ProvisioningInitializeResponse {}))))
            }
        })?;

        let p = provider.clone();
        session.broker.on("deploy_request", move |ctx, msg: ProvisioningMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::DeployRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected deploy_request");
                };
                let outputs = p.deploy(&req.environment, Some(ctx.progress_reporter())).await?;
                Ok(Some(reply(MessageType::DeployResponse(ProvisioningDeployResponse {
                    outputs: outputs.outputs.into_iter().collect(),
                }))))
            }
        })?;

        let p = provider;
        session.broker.on("destroy_request", move |_ctx, msg: ProvisioningMessage| {
            let p = p.clone();
            async move {
                let Some(MessageType::DestroyRequest(req)) = msg.message_type else {
                    anyhow::bail!("expected destroy_request");
                };
                let invalidated_outputs = p.destroy(&req.environment, req.purge).await?;
                Ok(Some(reply(MessageType::DestroyResponse(ProvisioningDestroyResponse {
                    invalidated_outputs,
                }))))
            }
        })?;

        Ok(session)
    }
}
