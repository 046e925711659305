// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Dispatcher
//!
//! The host's own lifecycle event pipeline. Project-scoped handlers are keyed
//! by event name; service-scoped handlers by (service, event). Raising an event
//! runs the matching handlers one after another in registration order and
//! stops at the first failure.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Hook point for extension lifecycle subscriptions

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::event_bridge::EventBridgeError;
use crate::domain::project::{ProjectEventArgs, ServiceEventArgs};

type ProjectHandler =
    Arc<dyn Fn(ProjectEventArgs, CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ServiceHandler =
    Arc<dyn Fn(ServiceEventArgs, CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("handler for '{event}' failed: {message}")]
    HandlerFailed { event: String, message: String },

    #[error("'{event}' cancelled")]
    Cancelled { event: String },

    /// The extension behind a hook went away or could not take the
    /// invocation, as opposed to running it and reporting a failure.
    #[error("extension hook for '{event}' did not complete: {source}")]
    Extension { event: String, source: EventBridgeError },
}

struct ProjectEntry {
    id: u64,
    event: String,
    handler: ProjectHandler,
}

struct ServiceEntry {
    id: u64,
    service: String,
    event: String,
    handler: ServiceHandler,
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    project: Vec<ProjectEntry>,
    service: Vec<ServiceEntry>,
}

#[derive(Clone, Default)]
pub struct LifecycleDispatcher {
    handlers: Arc<Mutex<Handlers>>,
}

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_project_event<F, Fut>(&self, event: &str, handler: F) -> HandlerRegistration
    where
        F: Fn(ProjectEventArgs, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut handlers = self.handlers.lock();
        handlers.next_id += 1;
        let id = handlers.next_id;
        handlers.project.push(ProjectEntry {
            id,
            event: event.to_string(),
            handler: Arc::new(move |args, cancel| handler(args, cancel).boxed()),
        });
        HandlerRegistration {
            id,
            handlers: self.handlers.clone(),
        }
    }

    pub fn on_service_event<F, Fut>(&self, service: &str, event: &str, handler: F) -> HandlerRegistration
    where
        F: Fn(ServiceEventArgs, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut handlers = self.handlers.lock();
        handlers.next_id += 1;
        let id = handlers.next_id;
        handlers.service.push(ServiceEntry {
            id,
            service: service.to_string(),
            event: event.to_string(),
            handler: Arc::new(move |args, cancel| handler(args, cancel).boxed()),
        });
        HandlerRegistration {
            id,
            handlers: self.handlers.clone(),
        }
    }

    pub async fn raise_project_event(
        &self,
        event: &str,
        args: ProjectEventArgs,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let matching: Vec<ProjectHandler> = self
            .handlers
            .lock()
            .project
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| entry.handler.clone())
            .collect();

        debug!(event, handlers = matching.len(), "Raising project event");
        for handler in matching {
            run_handler(event, handler(args.clone(), cancel.clone()), cancel).await?;
        }
        Ok(())
    }

    pub async fn raise_service_event(
        &self,
        event: &str,
        args: ServiceEventArgs,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        let service = args.service.name.clone();
        let matching: Vec<ServiceHandler> = self
            .handlers
            .lock()
            .service
            .iter()
            .filter(|entry| entry.event == event && entry.service == service)
            .map(|entry| entry.handler.clone())
            .collect();

        debug!(event, service = %service, handlers = matching.len(), "Raising service event");
        for handler in matching {
            run_handler(event, handler(args.clone(), cancel.clone()), cancel).await?;
        }
        Ok(())
    }

    pub fn handler_count(&self) -> usize {
        let handlers = self.handlers.lock();
        handlers.project.len() + handlers.service.len()
    }
}

async fn run_handler(
    event: &str,
    fut: BoxFuture<'static, anyhow::Result<()>>,
    cancel: &CancellationToken,
) -> Result<(), LifecycleError> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(LifecycleError::Cancelled { event: event.to_string() });
        }
        result = fut => result,
    };

    result.map_err(|err| {
        warn!(event, error = %err, "Lifecycle handler failed");
        let event = event.to_string();
        match err.downcast_ref::<EventBridgeError>() {
            Some(EventBridgeError::Cancelled(_)) => LifecycleError::Cancelled { event },
            Some(EventBridgeError::HookFailed { .. }) | None => LifecycleError::HandlerFailed {
                event,
                message: format!("{err:#}"),
            },
            Some(source) => LifecycleError::Extension {
                event,
                source: source.clone(),
            },
        }
    })
}

/// Removes its handler from the dispatcher when dropped.
pub struct HandlerRegistration {
    id: u64,
    handlers: Arc<Mutex<Handlers>>,
}

impl Drop for HandlerRegistration {
    fn drop(&mut self) {
        let mut handlers = self.handlers.lock();
        handlers.project.retain(|entry| entry.id != self.id);
        handlers.service.retain(|entry| entry.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::{ProjectConfig, ServiceConfig, ServiceContext};

    fn project_args() -> ProjectEventArgs {
        ProjectEventArgs {
            project: ProjectConfig {
                name: "demo".into(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_and_stop_at_first_failure() {
        let dispatcher = LifecycleDispatcher::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let _a = {
            let calls = calls.clone();
            dispatcher.on_project_event("predeploy", move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.lock().push("a");
                    Ok(())
                }
            })
        };
        let _b = {
            let calls = calls.clone();
            dispatcher.on_project_event("predeploy", move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.lock().push("b");
                    anyhow::bail!("quota exceeded")
                }
            })
        };
        let _c = {
            let calls = calls.clone();
            dispatcher.on_project_event("predeploy", move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.lock().push("c");
                    Ok(())
                }
            })
        };

        let err = dispatcher
            .raise_project_event("predeploy", project_args(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LifecycleError::HandlerFailed {
                event: "predeploy".into(),
                message: "quota exceeded".into()
            }
        );
        assert_eq!(*calls.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_bridge_errors_keep_their_kind() {
        let dispatcher = LifecycleDispatcher::new();
        let _disconnected = dispatcher.on_project_event("predeploy", |_, _| async {
            Err(EventBridgeError::Disconnected("ext:predeploy".into()).into())
        });
        let _cancelled = dispatcher.on_project_event("postdeploy", |_, _| async {
            Err(EventBridgeError::Cancelled("ext:postdeploy".into()).into())
        });
        let _failed = dispatcher.on_project_event("preprovision", |_, _| async {
            Err(EventBridgeError::HookFailed {
                key: "ext:preprovision".into(),
                message: "bicep invalid".into(),
            }
            .into())
        });

        let cancel = CancellationToken::new();
        assert_eq!(
            dispatcher.raise_project_event("predeploy", project_args(), &cancel).await,
            Err(LifecycleError::Extension {
                event: "predeploy".into(),
                source: EventBridgeError::Disconnected("ext:predeploy".into()),
            })
        );
        assert_eq!(
            dispatcher.raise_project_event("postdeploy", project_args(), &cancel).await,
            Err(LifecycleError::Cancelled {
                event: "postdeploy".into()
            })
        );
        match dispatcher
            .raise_project_event("preprovision", project_args(), &cancel)
            .await
        {
            Err(LifecycleError::HandlerFailed { message, .. }) => assert!(message.contains("bicep invalid")),
            other => panic!("expected handler failure, got {other:?}"),
        }

        let err = dispatcher
            .raise_project_event("predeploy", project_args(), &cancel)
            .await
            .unwrap_err();
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("event stream closed before hook 'ext:predeploy' completed")
        );
    }

    #[tokio::test]
    async fn test_dropped_registration_is_removed() {
        let dispatcher = LifecycleDispatcher::new();
        let reg = dispatcher.on_project_event("postprovision", |_, _| async { Ok(()) });
        assert_eq!(dispatcher.handler_count(), 1);

        drop(reg);
        assert_eq!(dispatcher.handler_count(), 0);
        dispatcher
            .raise_project_event("postprovision", project_args(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_service_handlers_scoped_by_service_name() {
        let dispatcher = LifecycleDispatcher::new();
        let _reg = dispatcher.on_service_event("api", "prepackage", |_, _| async {
            anyhow::bail!("api only")
        });

        let args = |name: &str| ServiceEventArgs {
            project: ProjectConfig::default(),
            service: ServiceConfig {
                name: name.into(),
                ..Default::default()
            },
            service_context: ServiceContext::default(),
        };

        let cancel = CancellationToken::new();
        dispatcher
            .raise_service_event("prepackage", args("web"), &cancel)
            .await
            .unwrap();
        assert!(dispatcher
            .raise_service_event("prepackage", args("api"), &cancel)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_handler() {
        let dispatcher = LifecycleDispatcher::new();
        let _reg = dispatcher.on_project_event("predeploy", |_, cancel| async move {
            cancel.cancelled().await;
            Ok(())
        });

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            dispatcher
                .raise_project_event("predeploy", project_args(), &cancel)
                .await,
            Err(LifecycleError::Cancelled {
                event: "predeploy".into()
            })
        );
    }
}
