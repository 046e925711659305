// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lifecycle hooks round-tripped through a real event stream.

mod common;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Code;

use common::{channel, eventually, extension, sample_project, start_host, BearerToken};
use exthost_core::application::event_bridge::EventBridgeError;
use exthost_core::application::lifecycle::LifecycleError;
use exthost_core::domain::capability::CapabilityKind;
use exthost_core::domain::project::{ProjectEventArgs, ServiceContext, ServiceEventArgs};
use exthost_core::infrastructure::proto::event_message::MessageType;
use exthost_core::infrastructure::proto::event_service_client::EventServiceClient;
use exthost_core::infrastructure::proto::{
    EventMessage, ExtensionReadyEvent, ProjectHandlerStatus, ServiceHandlerStatus,
    SubscribeProjectEvent, SubscribeServiceEvent,
};

const HOOKS: &str = "contoso.hooks";

fn project_args() -> ProjectEventArgs {
    ProjectEventArgs {
        project: sample_project(),
    }
}

fn service_args(name: &str) -> ServiceEventArgs {
    let project = sample_project();
    let service = project.services[name].clone();
    ServiceEventArgs {
        project,
        service,
        service_context: ServiceContext {
            build_artifacts: vec!["dist/app.whl".into()],
            package_artifacts: vec![],
        },
    }
}

#[tokio::test]
async fn test_event_stream_requires_lifecycle_capability() {
    let host = start_host(vec![extension(
        "contoso.aca",
        &[CapabilityKind::ServiceTargetProvider],
    )])
    .await;
    let token = BearerToken::for_extension(&host, "contoso.aca");
    let mut client = EventServiceClient::with_interceptor(channel(&host).await, token);

    let (_tx, rx) = mpsc::channel::<EventMessage>(4);
    let status = client.event_stream(ReceiverStream::new(rx)).await.unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_project_and_service_hooks_round_trip() {
    let host = start_host(vec![extension(HOOKS, &[CapabilityKind::LifecycleEvents])]).await;
    let token = BearerToken::for_extension(&host, HOOKS);
    let mut client = EventServiceClient::with_interceptor(channel(&host).await, token);

    let (tx, rx) = mpsc::channel(16);
    tx.send(EventMessage::of(MessageType::SubscribeProjectEvent(SubscribeProjectEvent {
        event_names: vec!["predeploy".into()],
    })))
    .await
    .unwrap();
    tx.send(EventMessage::of(MessageType::SubscribeServiceEvent(SubscribeServiceEvent {
        event_names: vec!["prepackage".into()],
        language: "python".into(),
        host: String::new(),
    })))
    .await
    .unwrap();
    tx.send(EventMessage::of(MessageType::ExtensionReadyEvent(ExtensionReadyEvent {
        status: "ready".into(),
        message: String::new(),
    })))
    .await
    .unwrap();

    let mut inbound = client.event_stream(ReceiverStream::new(rx)).await.unwrap().into_inner();
    host.wait_ready(HOOKS).await.unwrap();
    // One project handler plus one service handler: only "api" is a python service.
    assert_eq!(host.lifecycle().handler_count(), 2);

    // Extension side: succeed project hooks, fail service hooks.
    let responder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(Some(msg)) = inbound.message().await {
            match msg.message_type {
                Some(MessageType::InvokeProjectHandler(invoke)) => {
                    seen.push(format!("project:{}", invoke.event_name));
                    tx.send(EventMessage::of(MessageType::ProjectHandlerStatus(ProjectHandlerStatus {
                        event_name: invoke.event_name,
                        status: "completed".into(),
                        message: String::new(),
                    })))
                    .await
                    .unwrap();
                }
                Some(MessageType::InvokeServiceHandler(invoke)) => {
                    let service = invoke.service.unwrap_or_default();
                    let context = invoke.service_context.unwrap_or_default();
                    seen.push(format!("service:{}:{}", service.name, invoke.event_name));
                    seen.push(format!("artifacts:{}", context.build_artifacts.join(",")));
                    tx.send(EventMessage::of(MessageType::ServiceHandlerStatus(ServiceHandlerStatus {
                        event_name: invoke.event_name,
                        service_name: service.name,
                        status: "failed".into(),
                        message: "lint errors".into(),
                    })))
                    .await
                    .unwrap();
                    break;
                }
                _ => {}
            }
        }
        seen
    });

    let cancel = CancellationToken::new();
    host.lifecycle()
        .raise_project_event("predeploy", project_args(), &cancel)
        .await
        .unwrap();

    // Events nobody subscribed to resolve immediately.
    host.lifecycle()
        .raise_project_event("postdeploy", project_args(), &cancel)
        .await
        .unwrap();
    host.lifecycle()
        .raise_service_event("prepackage", service_args("web"), &cancel)
        .await
        .unwrap();

    let err = host
        .lifecycle()
        .raise_service_event("prepackage", service_args("api"), &cancel)
        .await
        .unwrap_err();
    match err {
        LifecycleError::HandlerFailed { event, message } => {
            assert_eq!(event, "prepackage");
            assert!(message.contains("lint errors"), "unexpected message: {message}");
        }
        other => panic!("expected handler failure, got {other:?}"),
    }

    let seen = responder.await.unwrap();
    assert_eq!(
        seen,
        vec![
            "project:predeploy".to_string(),
            "service:api:prepackage".to_string(),
            "artifacts:dist/app.whl".to_string(),
        ]
    );

    // The responder dropped its half of the stream; subscriptions go with it.
    assert!(eventually(|| async { host.lifecycle().handler_count() == 0 }).await);
    assert_eq!(host.event_bridge().pending_invocations(), 0);

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_hook_fails_when_extension_disconnects_mid_invocation() {
    let host = start_host(vec![extension(HOOKS, &[CapabilityKind::LifecycleEvents])]).await;
    let token = BearerToken::for_extension(&host, HOOKS);
    let mut client = EventServiceClient::with_interceptor(channel(&host).await, token);

    let (tx, rx) = mpsc::channel(4);
    tx.send(EventMessage::of(MessageType::SubscribeProjectEvent(SubscribeProjectEvent {
        event_names: vec!["predeploy".into()],
    })))
    .await
    .unwrap();
    tx.send(EventMessage::of(MessageType::ExtensionReadyEvent(ExtensionReadyEvent {
        status: "ready".into(),
        message: String::new(),
    })))
    .await
    .unwrap();
    let mut inbound = client.event_stream(ReceiverStream::new(rx)).await.unwrap().into_inner();
    host.wait_ready(HOOKS).await.unwrap();

    // Receive the invocation, then hang up without answering.
    let disconnect = tokio::spawn(async move {
        let msg = inbound.message().await.unwrap().unwrap();
        assert!(matches!(msg.message_type, Some(MessageType::InvokeProjectHandler(_))));
        drop(tx);
        drop(inbound);
    });

    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        host.lifecycle().raise_project_event("predeploy", project_args(), &cancel),
    )
    .await
    .expect("hook should not hang after disconnect");
    assert!(matches!(
        result,
        Err(LifecycleError::Extension {
            source: EventBridgeError::Disconnected(_),
            ..
        })
    ));

    disconnect.await.unwrap();
    assert_eq!(host.event_bridge().pending_invocations(), 0);
    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_hook_releases_pending_invocation() {
    let host = start_host(vec![extension(HOOKS, &[CapabilityKind::LifecycleEvents])]).await;
    let token = BearerToken::for_extension(&host, HOOKS);
    let mut client = EventServiceClient::with_interceptor(channel(&host).await, token);

    let (tx, rx) = mpsc::channel(4);
    tx.send(EventMessage::of(MessageType::SubscribeProjectEvent(SubscribeProjectEvent {
        event_names: vec!["predeploy".into()],
    })))
    .await
    .unwrap();
    tx.send(EventMessage::of(MessageType::ExtensionReadyEvent(ExtensionReadyEvent {
        status: "ready".into(),
        message: String::new(),
    })))
    .await
    .unwrap();
    let mut inbound = client.event_stream(ReceiverStream::new(rx)).await.unwrap().into_inner();
    host.wait_ready(HOOKS).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let canceller = tokio::spawn(async move {
        let msg = inbound.message().await.unwrap().unwrap();
        assert!(matches!(msg.message_type, Some(MessageType::InvokeProjectHandler(_))));
        trigger.cancel();
        (tx, inbound)
    });

    let result = host
        .lifecycle()
        .raise_project_event("predeploy", project_args(), &cancel)
        .await;
    assert!(matches!(result, Err(LifecycleError::Cancelled { .. })));
    assert_eq!(host.event_bridge().pending_invocations(), 0);

    // A late status for the cancelled hook is dropped, and the stream stays usable.
    let (tx, mut inbound) = canceller.await.unwrap();
    tx.send(EventMessage::of(MessageType::ProjectHandlerStatus(ProjectHandlerStatus {
        event_name: "predeploy".into(),
        status: "completed".into(),
        message: String::new(),
    })))
    .await
    .unwrap();

    let responder = tokio::spawn(async move {
        let msg = inbound.message().await.unwrap().unwrap();
        if let Some(MessageType::InvokeProjectHandler(invoke)) = msg.message_type {
            tx.send(EventMessage::of(MessageType::ProjectHandlerStatus(ProjectHandlerStatus {
                event_name: invoke.event_name,
                status: "completed".into(),
                message: String::new(),
            })))
            .await
            .unwrap();
        }
        (tx, inbound)
    });

    host.lifecycle()
        .raise_project_event("predeploy", project_args(), &CancellationToken::new())
        .await
        .unwrap();

    drop(responder.await.unwrap());
    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_ready_event_fails_wait() {
    let host = start_host(vec![extension(HOOKS, &[CapabilityKind::LifecycleEvents])]).await;
    let token = BearerToken::for_extension(&host, HOOKS);
    let mut client = EventServiceClient::with_interceptor(channel(&host).await, token);

    let (tx, rx) = mpsc::channel(4);
    tx.send(EventMessage::of(MessageType::ExtensionReadyEvent(ExtensionReadyEvent {
        status: "failed".into(),
        message: "missing credentials".into(),
    })))
    .await
    .unwrap();
    let inbound = client.event_stream(ReceiverStream::new(rx)).await.unwrap().into_inner();

    let err = host.wait_ready(HOOKS).await.unwrap_err();
    assert!(err.to_string().contains("missing credentials"));

    drop((tx, inbound));
    host.shutdown().await.unwrap();
}
