// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::ExtensionClient;
use crate::error::SdkError;
use crate::events::{EventHandlers, EventSession};
use exthost_core::domain::provider::{FrameworkServiceProvider, ProvisioningProvider, ServiceTargetProvider};

/// Everything one extension process contributes, registered and served
/// together.
pub struct ExtensionApp {
    client: ExtensionClient,
    service_targets: Vec<(String, Arc<dyn ServiceTargetProvider>)>,
    framework_services: Vec<(String, Arc<dyn FrameworkServiceProvider>)>,
    provisioning: Vec<(String, Arc<dyn ProvisioningProvider>)>,
    events: EventHandlers,
}

impl ExtensionApp {
    pub fn new(client: ExtensionClient) -> Self {
        Self {
            client,
            service_targets: Vec::new(),
            framework_services: Vec::new(),
            provisioning: Vec::new(),
            events: EventHandlers::new(),
        }
    }

    pub fn with_service_target(mut self, host: &str, provider: Arc<dyn ServiceTargetProvider>) -> Self {
        self.service_targets.push((host.to_string(), provider));
        self
    }

    pub fn with_framework_service(mut self, language: &str, provider: Arc<dyn FrameworkServiceProvider>) -> Self {
        self.framework_services.push((language.to_string(), provider));
        self
    }

    pub fn with_provisioning(mut self, name: &str, provider: Arc<dyn ProvisioningProvider>) -> Self {
        self.provisioning.push((name.to_string(), provider));
        self
    }

    pub fn with_events(mut self, handlers: EventHandlers) -> Self {
        self.events = handlers;
        self
    }

    /// Register every provider, subscribe to events, report ready, then
    /// serve until the host disconnects or `cancel` fires. The first session
    /// to fail stops the others.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SdkError> {
        let stop = cancel.child_token();
        let mut sessions = JoinSet::new();

        for (host, provider) in self.service_targets {
            let session = self.client.serve_service_target(&host, provider).await?;
            sessions.spawn(session.run(stop.clone()));
        }
        for (language, provider) in self.framework_services {
            let session = self.client.serve_framework_service(&language, provider).await?;
            sessions.spawn(session.run(stop.clone()));
        }
        for (name, provider) in self.provisioning {
            let session = self.client.serve_provisioning(&name, provider).await?;
            sessions.spawn(session.run(stop.clone()));
        }

        if !self.events.is_empty() {
            let session = EventSession::open(&self.client, self.events).await?;
            session.ready().await?;
            sessions.spawn(session.run(stop.clone()));
        }

        info!(sessions = sessions.len(), "Extension running");

        let mut first_error = None;
        while let Some(joined) = sessions.join_next().await {
            let result = joined.map_err(SdkError::from).and_then(|r| r);
            if let Err(e) = result {
                warn!(error = %e, "Extension session failed");
                stop.cancel();
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
