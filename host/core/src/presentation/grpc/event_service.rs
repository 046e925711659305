// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle event stream. An extension subscribes to project or service
//! events, receives invoke messages when they fire, and answers each with a
//! status message. Subscriptions live exactly as long as the stream.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use super::auth::request_identity;
use super::server::HostState;
use crate::application::event_bridge::{EventBridgeError, HookChannel, HookStatus, STATUS_FAILED};
use crate::application::lifecycle::HandlerRegistration;
use crate::application::readiness::ReadyState;
use crate::domain::capability::CapabilityKind;
use crate::domain::project::{ProjectEventArgs, ServiceEventArgs, ServiceFilter};
use crate::infrastructure::broker::{BrokerError, MessageBroker};
use crate::infrastructure::proto::event_message::MessageType;
use crate::infrastructure::proto::event_service_server::EventService;
use crate::infrastructure::proto::{EventMessage, InvokeProjectHandler, InvokeServiceHandler};

const STREAM_BUFFER: usize = 32;

/// Sends invoke messages over one extension's event stream.
struct EventStreamChannel {
    broker: Arc<MessageBroker<EventMessage>>,
}

#[async_trait]
impl HookChannel for EventStreamChannel {
    async fn invoke_project(&self, event: &str, args: &ProjectEventArgs) -> Result<(), EventBridgeError> {
        let msg = EventMessage::of(MessageType::InvokeProjectHandler(InvokeProjectHandler {
            event_name: event.to_string(),
            project: Some((&args.project).into()),
        }));
        self.broker
            .send(msg)
            .await
            .map_err(|_| EventBridgeError::Disconnected(event.to_string()))
    }

    async fn invoke_service(&self, event: &str, args: &ServiceEventArgs) -> Result<(), EventBridgeError> {
        let msg = EventMessage::of(MessageType::InvokeServiceHandler(InvokeServiceHandler {
            event_name: event.to_string(),
            project: Some((&args.project).into()),
            service: Some((&args.service).into()),
            service_context: Some((&args.service_context).into()),
        }));
        self.broker
            .send(msg)
            .await
            .map_err(|_| EventBridgeError::Disconnected(event.to_string()))
    }

    async fn closed(&self) {
        self.broker.closed().await
    }
}

pub struct EventEndpoint {
    state: Arc<HostState>,
}

impl EventEndpoint {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }

    fn install_handlers(
        &self,
        extension_id: &str,
        broker: &Arc<MessageBroker<EventMessage>>,
        subscriptions: &Arc<Mutex<Vec<HandlerRegistration>>>,
    ) -> Result<(), BrokerError> {
        let channel: Arc<dyn HookChannel> = Arc::new(EventStreamChannel {
            broker: broker.clone(),
        });

        {
            let bridge = self.state.event_bridge.clone();
            let subscriptions = subscriptions.clone();
            let channel = channel.clone();
            let extension_id = extension_id.to_string();
            broker.on("subscribe_project_event", move |_ctx, msg: EventMessage| {
                let result = match msg.message_type {
                    Some(MessageType::SubscribeProjectEvent(sub)) => {
                        let regs = bridge.subscribe_project_events(&extension_id, &sub.event_names, channel.clone());
                        subscriptions.lock().extend(regs);
                        Ok(None)
                    }
                    _ => Ok(None),
                };
                async move { result }
            })?;
        }

        {
            let bridge = self.state.event_bridge.clone();
            let subscriptions = subscriptions.clone();
            let channel = channel.clone();
            let extension_id = extension_id.to_string();
            broker.on("subscribe_service_event", move |_ctx, msg: EventMessage| {
                let result = match msg.message_type {
                    Some(MessageType::SubscribeServiceEvent(sub)) => {
                        let filter = ServiceFilter::new(&sub.language, &sub.host);
                        bridge
                            .subscribe_service_events(&extension_id, &sub.event_names, &filter, channel.clone())
                            .map(|regs| {
                                subscriptions.lock().extend(regs);
                                None
                            })
                            .map_err(anyhow::Error::from)
                    }
                    _ => Ok(None),
                };
                async move { result }
            })?;
        }

        {
            let bridge = self.state.event_bridge.clone();
            let extension_id = extension_id.to_string();
            broker.on("project_handler_status", move |_ctx, msg: EventMessage| {
                if let Some(MessageType::ProjectHandlerStatus(status)) = msg.message_type {
                    bridge.dispatch_project_status(
                        &extension_id,
                        &status.event_name,
                        HookStatus {
                            status: status.status,
                            message: status.message,
                        },
                    );
                }
                async { Ok(None) }
            })?;
        }

        {
            let bridge = self.state.event_bridge.clone();
            let extension_id = extension_id.to_string();
            broker.on("service_handler_status", move |_ctx, msg: EventMessage| {
                if let Some(MessageType::ServiceHandlerStatus(status)) = msg.message_type {
                    bridge.dispatch_service_status(
                        &extension_id,
                        &status.service_name,
                        &status.event_name,
                        HookStatus {
                            status: status.status,
                            message: status.message,
                        },
                    );
                }
                async { Ok(None) }
            })?;
        }

        {
            let readiness = self.state.readiness.clone();
            let extension_id = extension_id.to_string();
            broker.on("extension_ready_event", move |_ctx, msg: EventMessage| {
                if let Some(MessageType::ExtensionReadyEvent(ready)) = msg.message_type {
                    let state = if ready.status == STATUS_FAILED {
                        ReadyState::Failed(ready.message)
                    } else {
                        ReadyState::Ready
                    };
                    readiness.mark(&extension_id, state);
                }
                async { Ok(None) }
            })?;
        }

        Ok(())
    }
}

#[tonic::async_trait]
impl EventService for EventEndpoint {
    type EventStreamStream = ReceiverStream<Result<EventMessage, Status>>;

    async fn event_stream(
        &self,
        request: Request<Streaming<EventMessage>>,
    ) -> Result<Response<Self::EventStreamStream>, Status> {
        let identity = request_identity(&request)?;
        let extension = self
            .state
            .registration
            .authorize(&identity, CapabilityKind::LifecycleEvents)?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let broker = Arc::new(MessageBroker::with_response_buffer(
            format!("events:{}", extension.id),
            tx,
            self.state.settings.broker_response_buffer,
        ));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        self.install_handlers(&extension.id, &broker, &subscriptions)
            .map_err(|e| Status::internal(e.to_string()))?;

        let cancel = self.state.registration.shutdown_token().child_token();
        let inbound = request.into_inner();
        tokio::spawn(async move {
            info!(extension_id = %extension.id, "Event stream opened");
            match broker.run(inbound, cancel).await {
                Ok(()) | Err(BrokerError::Cancelled) => {
                    info!(extension_id = %extension.id, "Event stream closed");
                }
                Err(e) => warn!(extension_id = %extension.id, error = %e, "Event stream failed"),
            }
            let removed = std::mem::take(&mut *subscriptions.lock());
            info!(extension_id = %extension.id, handlers = removed.len(), "Removing lifecycle subscriptions");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
