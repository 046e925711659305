// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Bridge
//!
//! Connects the host's [`LifecycleDispatcher`] to extensions subscribed over
//! the event stream. When a subscribed event fires, the bridge sends an
//! invoke message to the extension and blocks the host pipeline until the
//! matching status message comes back (or the caller cancels).
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Invoke-then-await round trip for extension lifecycle hooks
//!
//! ## Correlation
//!
//! Project invocations are keyed by [`ProjectHookKey`] (extension, event) and
//! service invocations by [`ServiceHookKey`] (extension, service, event), each
//! in its own table. Keys are compared field by field, so a status message can
//! only resolve an invocation of the scope it was sent for and of the
//! extension that sent it. Only one invocation per key may be in flight.
//! Status messages with no waiting invocation (late, duplicate, or after
//! cancellation) are dropped with a warning and counted.

use async_trait::async_trait;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::lifecycle::{HandlerRegistration, LifecycleDispatcher};
use crate::domain::project::{ProjectEventArgs, ProjectSource, ServiceEventArgs, ServiceFilter};
use crate::infrastructure::pending::{Delivery, PendingCallError, PendingCalls};

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EventBridgeError {
    #[error("hook '{key}' failed: {message}")]
    HookFailed { key: String, message: String },

    #[error("hook '{0}' is already in flight")]
    InvocationInFlight(String),

    #[error("hook '{0}' cancelled")]
    Cancelled(String),

    #[error("event stream closed before hook '{0}' completed")]
    Disconnected(String),

    #[error("no project is loaded")]
    NoProject,
}

/// Status reported by an extension for one hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookStatus {
    pub status: String,
    pub message: String,
}

impl HookStatus {
    pub fn is_failed(&self) -> bool {
        self.status == STATUS_FAILED
    }
}

/// Outbound half of an extension's event stream.
#[async_trait]
pub trait HookChannel: Send + Sync {
    async fn invoke_project(&self, event: &str, args: &ProjectEventArgs) -> Result<(), EventBridgeError>;

    async fn invoke_service(&self, event: &str, args: &ServiceEventArgs) -> Result<(), EventBridgeError>;

    /// Resolves once the extension's stream has ended.
    async fn closed(&self);
}

/// Correlates a project hook invocation with its status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectHookKey {
    pub extension_id: String,
    pub event: String,
}

impl ProjectHookKey {
    pub fn new(extension_id: &str, event: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            event: event.to_string(),
        }
    }
}

impl fmt::Display for ProjectHookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.extension_id, self.event)
    }
}

/// Correlates a service hook invocation with its status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHookKey {
    pub extension_id: String,
    pub service: String,
    pub event: String,
}

impl ServiceHookKey {
    pub fn new(extension_id: &str, service: &str, event: &str) -> Self {
        Self {
            extension_id: extension_id.to_string(),
            service: service.to_string(),
            event: event.to_string(),
        }
    }
}

impl fmt::Display for ServiceHookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.extension_id, self.service, self.event)
    }
}

#[derive(Clone)]
pub struct EventBridge {
    dispatcher: LifecycleDispatcher,
    project_pending: PendingCalls<ProjectHookKey, HookStatus>,
    service_pending: PendingCalls<ServiceHookKey, HookStatus>,
    project: Arc<dyn ProjectSource>,
}

impl EventBridge {
    pub fn new(dispatcher: LifecycleDispatcher, project: Arc<dyn ProjectSource>) -> Self {
        Self {
            dispatcher,
            project_pending: PendingCalls::new(1),
            service_pending: PendingCalls::new(1),
            project,
        }
    }

    pub fn dispatcher(&self) -> &LifecycleDispatcher {
        &self.dispatcher
    }

    pub fn pending_invocations(&self) -> usize {
        self.project_pending.len() + self.service_pending.len()
    }

    /// Install one dispatcher handler per event name. Handlers are removed
    /// when the returned registrations are dropped.
    pub fn subscribe_project_events(
        &self,
        extension_id: &str,
        event_names: &[String],
        channel: Arc<dyn HookChannel>,
    ) -> Vec<HandlerRegistration> {
        event_names
            .iter()
            .map(|event| {
                let bridge = self.clone();
                let channel = channel.clone();
                let extension_id = extension_id.to_string();
                let event_name = event.clone();
                info!(extension_id = %extension_id, event = %event, "Extension subscribed to project event");

                self.dispatcher.on_project_event(event, move |args, cancel| {
                    let bridge = bridge.clone();
                    let channel = channel.clone();
                    let key = ProjectHookKey::new(&extension_id, &event_name);
                    let event_name = event_name.clone();
                    async move {
                        let send = channel.invoke_project(&event_name, &args);
                        bridge
                            .round_trip(&bridge.project_pending, "project", key, &cancel, channel.as_ref(), send)
                            .await
                            .map_err(anyhow::Error::from)
                    }
                })
            })
            .collect()
    }

    /// Install handlers for every service of the current project that
    /// matches `filter`, for each event name.
    pub fn subscribe_service_events(
        &self,
        extension_id: &str,
        event_names: &[String],
        filter: &ServiceFilter,
        channel: Arc<dyn HookChannel>,
    ) -> Result<Vec<HandlerRegistration>, EventBridgeError> {
        let project = self.project.project().ok_or(EventBridgeError::NoProject)?;

        let mut registrations = Vec::new();
        for (service_name, _) in project.matching_services(filter) {
            for event in event_names {
                let bridge = self.clone();
                let channel = channel.clone();
                let extension_id = extension_id.to_string();
                let event_name = event.clone();
                let service = service_name.clone();
                info!(
                    extension_id = %extension_id,
                    service = %service_name,
                    event = %event,
                    "Extension subscribed to service event"
                );

                let registration = self.dispatcher.on_service_event(service_name, event, move |args, cancel| {
                    let bridge = bridge.clone();
                    let channel = channel.clone();
                    let key = ServiceHookKey::new(&extension_id, &service, &event_name);
                    let event_name = event_name.clone();
                    async move {
                        let send = channel.invoke_service(&event_name, &args);
                        bridge
                            .round_trip(&bridge.service_pending, "service", key, &cancel, channel.as_ref(), send)
                            .await
                            .map_err(anyhow::Error::from)
                    }
                });
                registrations.push(registration);
            }
        }
        Ok(registrations)
    }

    /// Register the pending invocation, send the invoke message, and wait for
    /// the correlated status. The entry is removed on every exit path.
    async fn round_trip<K, F>(
        &self,
        table: &PendingCalls<K, HookStatus>,
        scope: &'static str,
        key: K,
        cancel: &CancellationToken,
        channel: &dyn HookChannel,
        send: F,
    ) -> Result<(), EventBridgeError>
    where
        K: Eq + Hash + Clone + fmt::Display + Send + 'static,
        F: std::future::Future<Output = Result<(), EventBridgeError>>,
    {
        let key_name = key.to_string();
        let call = table.register(key).map_err(|e| match e {
            PendingCallError::AlreadyPending(key) => EventBridgeError::InvocationInFlight(key),
            _ => EventBridgeError::Disconnected(key_name.clone()),
        })?;
        let key = key_name;

        if let Err(e) = send.await {
            record_invocation(scope, "send_failed");
            return Err(e);
        }

        let outcome = tokio::select! {
            outcome = call.wait(cancel) => outcome,
            _ = channel.closed() => Err(PendingCallError::Closed),
        };

        let status = match outcome {
            Ok(status) => status,
            Err(PendingCallError::Cancelled) => {
                record_invocation(scope, "cancelled");
                return Err(EventBridgeError::Cancelled(key));
            }
            Err(_) => {
                record_invocation(scope, "disconnected");
                return Err(EventBridgeError::Disconnected(key));
            }
        };

        if status.is_failed() {
            record_invocation(scope, "failed");
            warn!(key = %key, message = %status.message, "Extension hook reported failure");
            return Err(EventBridgeError::HookFailed {
                key,
                message: status.message,
            });
        }

        record_invocation(scope, "succeeded");
        Ok(())
    }

    pub fn dispatch_project_status(&self, extension_id: &str, event: &str, status: HookStatus) -> Delivery {
        let key = ProjectHookKey::new(extension_id, event);
        record_delivery("project", &key, self.project_pending.resolve(&key, status))
    }

    pub fn dispatch_service_status(
        &self,
        extension_id: &str,
        service: &str,
        event: &str,
        status: HookStatus,
    ) -> Delivery {
        let key = ServiceHookKey::new(extension_id, service, event);
        record_delivery("service", &key, self.service_pending.resolve(&key, status))
    }
}

fn record_delivery(scope: &'static str, key: &dyn fmt::Display, delivery: Delivery) -> Delivery {
    if delivery != Delivery::Delivered {
        warn!(scope, key = %key, ?delivery, "Dropping unmatched hook status");
        metrics::counter!("exthost_unmatched_status_total", "scope" => scope).increment(1);
    }
    delivery
}

fn record_invocation(scope: &'static str, outcome: &'static str) {
    metrics::counter!("exthost_lifecycle_invocations_total", "scope" => scope, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{ProjectConfig, ServiceConfig, StaticProjectSource};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Records invocations and forwards their correlation keys to the test.
    struct RecordingChannel {
        extension_id: String,
        sent: mpsc::UnboundedSender<String>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl HookChannel for RecordingChannel {
        async fn invoke_project(&self, event: &str, _args: &ProjectEventArgs) -> Result<(), EventBridgeError> {
            *self.calls.lock() += 1;
            let _ = self
                .sent
                .send(ProjectHookKey::new(&self.extension_id, event).to_string());
            Ok(())
        }

        async fn invoke_service(&self, event: &str, args: &ServiceEventArgs) -> Result<(), EventBridgeError> {
            *self.calls.lock() += 1;
            let _ = self
                .sent
                .send(ServiceHookKey::new(&self.extension_id, &args.service.name, event).to_string());
            Ok(())
        }

        async fn closed(&self) {
            futures::future::pending::<()>().await
        }
    }

    fn project() -> ProjectConfig {
        let mut services = BTreeMap::new();
        for (name, language) in [("api", "python"), ("web", "js")] {
            services.insert(
                name.to_string(),
                ServiceConfig {
                    name: name.to_string(),
                    language: language.to_string(),
                    host: "containerapp".to_string(),
                    ..Default::default()
                },
            );
        }
        ProjectConfig {
            name: "demo".into(),
            services,
        }
    }

    fn bridge() -> EventBridge {
        EventBridge::new(
            LifecycleDispatcher::new(),
            Arc::new(StaticProjectSource::new(Some(project()))),
        )
    }

    fn channel(extension_id: &str) -> (Arc<RecordingChannel>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(RecordingChannel {
                extension_id: extension_id.to_string(),
                sent: tx,
                calls: Mutex::new(0),
            }),
            rx,
        )
    }

    fn ok() -> HookStatus {
        HookStatus {
            status: "success".into(),
            message: String::new(),
        }
    }

    #[tokio::test]
    async fn test_project_hook_round_trip() {
        let bridge = bridge();
        let (chan, mut sent) = channel("ext.x");
        let _regs = bridge.subscribe_project_events("ext.x", &["predeploy".to_string()], chan.clone());

        let raise = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .dispatcher()
                    .raise_project_event(
                        "predeploy",
                        ProjectEventArgs { project: project() },
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        let key = sent.recv().await.unwrap();
        assert_eq!(key, "ext.x:predeploy");
        assert_eq!(bridge.pending_invocations(), 1);

        assert_eq!(bridge.dispatch_project_status("ext.x", "predeploy", ok()), Delivery::Delivered);
        raise.await.unwrap().unwrap();

        assert_eq!(*chan.calls.lock(), 1);
        assert_eq!(bridge.pending_invocations(), 0);

        // A late duplicate is dropped without effect.
        assert_eq!(bridge.dispatch_project_status("ext.x", "predeploy", ok()), Delivery::NoWaiter);
    }

    #[tokio::test]
    async fn test_service_status_cannot_resolve_project_hook_of_dotted_extension() {
        let bridge = bridge();
        let (chan, mut sent) = channel("contoso.aca");
        let _regs = bridge.subscribe_project_events("contoso.aca", &["predeploy".to_string()], chan);

        let raise = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .dispatcher()
                    .raise_project_event(
                        "predeploy",
                        ProjectEventArgs { project: project() },
                        &CancellationToken::new(),
                    )
                    .await
            })
        };
        sent.recv().await.unwrap();

        // Extension "contoso" reporting on its "aca" service must not reach
        // the project hook of extension "contoso.aca".
        let forged = HookStatus {
            status: STATUS_FAILED.into(),
            message: "forged".into(),
        };
        assert_eq!(
            bridge.dispatch_service_status("contoso", "aca", "predeploy", forged.clone()),
            Delivery::NoWaiter
        );
        assert_eq!(
            bridge.dispatch_project_status("contoso", "aca.predeploy", forged),
            Delivery::NoWaiter
        );
        assert_eq!(bridge.pending_invocations(), 1);

        assert_eq!(
            bridge.dispatch_project_status("contoso.aca", "predeploy", ok()),
            Delivery::Delivered
        );
        raise.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_status_surfaces_message() {
        let bridge = bridge();
        let (chan, mut sent) = channel("ext.x");
        let _regs = bridge.subscribe_project_events("ext.x", &["postdeploy".to_string()], chan);

        let raise = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .dispatcher()
                    .raise_project_event(
                        "postdeploy",
                        ProjectEventArgs { project: project() },
                        &CancellationToken::new(),
                    )
                    .await
            })
        };

        sent.recv().await.unwrap();
        bridge.dispatch_project_status(
            "ext.x",
            "postdeploy",
            HookStatus {
                status: STATUS_FAILED.into(),
                message: "smoke test failed".into(),
            },
        );

        let err = raise.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("smoke test failed"));
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_invocation() {
        let bridge = bridge();
        let (chan, mut sent) = channel("ext.x");
        let _regs = bridge.subscribe_project_events("ext.x", &["predeploy".to_string()], chan);

        let cancel = CancellationToken::new();
        let raise = {
            let bridge = bridge.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                bridge
                    .dispatcher()
                    .raise_project_event("predeploy", ProjectEventArgs { project: project() }, &cancel)
                    .await
            })
        };

        sent.recv().await.unwrap();
        cancel.cancel();
        assert!(raise.await.unwrap().is_err());

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(bridge.pending_invocations(), 0);
        assert_eq!(bridge.dispatch_project_status("ext.x", "predeploy", ok()), Delivery::NoWaiter);
    }

    #[tokio::test]
    async fn test_service_subscription_honors_filter() {
        let bridge = bridge();
        let (chan, mut sent) = channel("ext.py");
        let regs = bridge
            .subscribe_service_events(
                "ext.py",
                &["prepackage".to_string()],
                &ServiceFilter::new("python", ""),
                chan,
            )
            .unwrap();
        assert_eq!(regs.len(), 1);

        let project = project();
        let args = ServiceEventArgs {
            project: project.clone(),
            service: project.services["api"].clone(),
            service_context: Default::default(),
        };
        let raise = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .dispatcher()
                    .raise_service_event("prepackage", args, &CancellationToken::new())
                    .await
            })
        };

        assert_eq!(sent.recv().await.unwrap(), "ext.py:api:prepackage");
        assert_eq!(
            bridge.dispatch_service_status("ext.py", "api", "prepackage", ok()),
            Delivery::Delivered
        );
        raise.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_service_subscription_requires_project() {
        let bridge = EventBridge::new(
            LifecycleDispatcher::new(),
            Arc::new(StaticProjectSource::new(None)),
        );
        let (chan, _sent) = channel("ext.py");
        assert_eq!(
            bridge
                .subscribe_service_events("ext.py", &["prepackage".into()], &ServiceFilter::default(), chan)
                .err(),
            Some(EventBridgeError::NoProject)
        );
    }
}
