// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Lifecycle Event Subscriptions
//!
//! Extension half of the event stream: subscribe to project and service
//! events, run the matching handler when the host invokes one, and report
//! `completed` or `failed` back so the host pipeline can continue.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};
use tracing::{info, warn};

use crate::client::ExtensionClient;
use crate::error::SdkError;
use exthost_core::application::event_bridge::{STATUS_COMPLETED, STATUS_FAILED};
use exthost_core::domain::project::{ProjectConfig, ProjectEventArgs, ServiceConfig, ServiceContext, ServiceEventArgs};
use exthost_core::infrastructure::broker::{BrokerError, MessageBroker};
use exthost_core::infrastructure::proto::event_message::MessageType;
use exthost_core::infrastructure::proto::{
    EventMessage, ExtensionReadyEvent, ProjectHandlerStatus, ServiceHandlerStatus, SubscribeProjectEvent,
    SubscribeServiceEvent,
};

const STREAM_BUFFER: usize = 32;

type ProjectHandler = Arc<dyn Fn(ProjectEventArgs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ServiceHandler = Arc<dyn Fn(ServiceEventArgs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct ServiceSubscription {
    language: String,
    host: String,
    handler: ServiceHandler,
}

/// Event handlers an extension wants to receive.
#[derive(Default)]
pub struct EventHandlers {
    project: HashMap<String, ProjectHandler>,
    service: HashMap<String, ServiceSubscription>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.project.is_empty() && self.service.is_empty()
    }

    pub fn on_project_event<F, Fut>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(ProjectEventArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.project
            .insert(event.to_string(), Arc::new(move |args| handler(args).boxed()));
        self
    }

    /// Handle `event` for every service matching `language` and `host`.
    /// An empty filter field matches any service.
    pub fn on_service_event<F, Fut>(mut self, event: &str, language: &str, host: &str, handler: F) -> Self
    where
        F: Fn(ServiceEventArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.service.insert(
            event.to_string(),
            ServiceSubscription {
                language: language.to_string(),
                host: host.to_string(),
                handler: Arc::new(move |args| handler(args).boxed()),
            },
        );
        self
    }
}

fn status_of(result: &anyhow::Result<()>) -> (String, String) {
    match result {
        Ok(()) => (STATUS_COMPLETED.to_string(), String::new()),
        Err(err) => (STATUS_FAILED.to_string(), format!("{err:#}")),
    }
}

/// An open event stream with subscriptions sent.
pub struct EventSession {
    broker: Arc<MessageBroker<EventMessage>>,
    inbound: Streaming<EventMessage>,
}

impl EventSession {
    /// Open the event stream, subscribe, and install the invoke handlers.
    /// Readiness is reported separately with [`EventSession::ready`].
    pub async fn open(client: &ExtensionClient, handlers: EventHandlers) -> Result<Self, SdkError> {
        let (tx, rx) = mpsc::channel::<Result<EventMessage, Status>>(STREAM_BUFFER);

        if !handlers.project.is_empty() {
            let event_names = handlers.project.keys().cloned().collect();
            tx.send(Ok(EventMessage::of(MessageType::SubscribeProjectEvent(
                SubscribeProjectEvent { event_names },
            ))))
            .await
            .map_err(|_| SdkError::Closed)?;
        }
        for (event, sub) in &handlers.service {
            tx.send(Ok(EventMessage::of(MessageType::SubscribeServiceEvent(
                SubscribeServiceEvent {
                    event_names: vec![event.clone()],
                    language: sub.language.clone(),
                    host: sub.host.clone(),
                },
            ))))
            .await
            .map_err(|_| SdkError::Closed)?;
        }

        let outbound = Box::pin(ReceiverStream::new(rx).filter_map(Result::ok));
        let inbound = client.events().event_stream(outbound).await?.into_inner();
        let broker = Arc::new(MessageBroker::new("events", tx));

        let project = Arc::new(handlers.project);
        broker.on("invoke_project_handler", move |_ctx, msg: EventMessage| {
            let project = project.clone();
            async move {
                let Some(MessageType::InvokeProjectHandler(invoke)) = msg.message_type else {
                    return Ok(None);
                };
                let Some(handler) = project.get(&invoke.event_name).cloned() else {
                    warn!(event = %invoke.event_name, "No handler for invoked project event");
                    return Ok(None);
                };

                let args = ProjectEventArgs {
                    project: invoke.project.map(ProjectConfig::from).unwrap_or_default(),
                };
                let (status, message) = status_of(&handler(args).await);
                Ok(Some(EventMessage::of(MessageType::ProjectHandlerStatus(ProjectHandlerStatus {
                    event_name: invoke.event_name,
                    status,
                    message,
                }))))
            }
        })?;

        let service: Arc<HashMap<String, ServiceHandler>> = Arc::new(
            handlers
                .service
                .into_iter()
                .map(|(event, sub)| (event, sub.handler))
                .collect(),
        );
        broker.on("invoke_service_handler", move |_ctx, msg: EventMessage| {
            let service = service.clone();
            async move {
                let Some(MessageType::InvokeServiceHandler(invoke)) = msg.message_type else {
                    return Ok(None);
                };
                let Some(handler) = service.get(&invoke.event_name).cloned() else {
                    warn!(event = %invoke.event_name, "No handler for invoked service event");
                    return Ok(None);
                };

                let args = ServiceEventArgs {
                    project: invoke.project.map(ProjectConfig::from).unwrap_or_default(),
                    service: invoke.service.map(ServiceConfig::from).unwrap_or_default(),
                    service_context: invoke
                        .service_context
                        .map(ServiceContext::from)
                        .unwrap_or_default(),
                };
                let service_name = args.service.name.clone();
                let (status, message) = status_of(&handler(args).await);
                Ok(Some(EventMessage::of(MessageType::ServiceHandlerStatus(ServiceHandlerStatus {
                    event_name: invoke.event_name,
                    service_name,
                    status,
                    message,
                }))))
            }
        })?;

        Ok(Self { broker, inbound })
    }

    /// Tell the host this extension finished starting up.
    pub async fn ready(&self) -> Result<(), SdkError> {
        self.report_ready(STATUS_COMPLETED, "").await
    }

    /// Tell the host this extension failed to start.
    pub async fn failed(&self, message: &str) -> Result<(), SdkError> {
        self.report_ready(STATUS_FAILED, message).await
    }

    async fn report_ready(&self, status: &str, message: &str) -> Result<(), SdkError> {
        self.broker
            .send(EventMessage::of(MessageType::ExtensionReadyEvent(ExtensionReadyEvent {
                status: status.to_string(),
                message: message.to_string(),
            })))
            .await?;
        Ok(())
    }

    /// Serve invocations until the host closes the stream or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SdkError> {
        let result = self.broker.run(self.inbound, cancel).await;
        info!("Event session ended");
        match result {
            Ok(()) | Err(BrokerError::Cancelled) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
