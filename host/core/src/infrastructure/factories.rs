// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Factories
//!
//! Explicit factory table turning a freshly registered stream into the
//! capability adapter the host calls through. One factory per provider kind;
//! each receives the provider key and the stream's broker.

use std::sync::Arc;

use crate::domain::provider::{
    FrameworkServiceProvider, ProviderError, ProvisioningProvider, ServiceTargetProvider,
};
use crate::infrastructure::adapters::{
    RemoteFrameworkService, RemoteProvisioningProvider, RemoteServiceTarget,
};
use crate::infrastructure::broker::MessageBroker;
use crate::infrastructure::proto::{FrameworkServiceMessage, ProvisioningMessage, ServiceTargetMessage};

pub type ProviderFactory<P, M> =
    Arc<dyn Fn(&str, Arc<MessageBroker<M>>) -> Result<Arc<P>, ProviderError> + Send + Sync>;

#[derive(Clone)]
pub struct ProviderFactories {
    pub service_target: ProviderFactory<dyn ServiceTargetProvider, ServiceTargetMessage>,
    pub framework_service: ProviderFactory<dyn FrameworkServiceProvider, FrameworkServiceMessage>,
    pub provisioning: ProviderFactory<dyn ProvisioningProvider, ProvisioningMessage>,
}

impl Default for ProviderFactories {
    fn default() -> Self {
        Self {
            service_target: Arc::new(remote_service_target),
            framework_service: Arc::new(remote_framework_service),
            provisioning: Arc::new(remote_provisioning),
        }
    }
}

fn remote_service_target(
    host: &str,
    broker: Arc<MessageBroker<ServiceTargetMessage>>,
) -> Result<Arc<dyn ServiceTargetProvider>, ProviderError> {
    Ok(Arc::new(RemoteServiceTarget::new(host, broker)))
}

fn remote_framework_service(
    language: &str,
    broker: Arc<MessageBroker<FrameworkServiceMessage>>,
) -> Result<Arc<dyn FrameworkServiceProvider>, ProviderError> {
    Ok(Arc::new(RemoteFrameworkService::new(language, broker)))
}

fn remote_provisioning(
    name: &str,
    broker: Arc<MessageBroker<ProvisioningMessage>>,
) -> Result<Arc<dyn ProvisioningProvider>, ProviderError> {
    Ok(Arc::new(RemoteProvisioningProvider::new(name, broker)))
}

impl ProviderFactories {
    pub fn with_service_target(
        mut self,
        factory: ProviderFactory<dyn ServiceTargetProvider, ServiceTargetMessage>,
    ) -> Self {
        self.service_target = factory;
        self
    }

    pub fn with_framework_service(
        mut self,
        factory: ProviderFactory<dyn FrameworkServiceProvider, FrameworkServiceMessage>,
    ) -> Self {
        self.framework_service = factory;
        self
    }

    pub fn with_provisioning(
        mut self,
        factory: ProviderFactory<dyn ProvisioningProvider, ProvisioningMessage>,
    ) -> Self {
        self.provisioning = factory;
        self
    }
}
