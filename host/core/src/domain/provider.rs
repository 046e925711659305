// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Capabilities
//!
//! Host-facing interfaces for the three kinds of provider an extension can
//! register. The host only ever talks to these traits; the adapters in
//! `crate::infrastructure::adapters` implement them by forwarding each call
//! over the extension's registered stream.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::project::{ServiceConfig, ServiceContext, TargetResource};

/// Callback receiving progress text while a provider call is in flight.
pub type ProgressReporter = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The extension answered with an error payload.
    #[error("extension reported an error: {0}")]
    Remote(String),

    /// The extension's stream closed before it answered.
    #[error("provider stream closed")]
    Disconnected,

    #[error("unexpected response from extension: expected {expected}")]
    UnexpectedResponse { expected: &'static str },

    #[error("failed to construct provider: {0}")]
    Construction(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployResult {
    pub deployment_id: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOutputs {
    pub outputs: BTreeMap<String, String>,
}

#[async_trait]
pub trait ServiceTargetProvider: Send + Sync {
    async fn initialize(&self, service: &ServiceConfig) -> Result<(), ProviderError>;

    async fn endpoints(
        &self,
        service: &ServiceConfig,
        target: &TargetResource,
    ) -> Result<Vec<String>, ProviderError>;

    async fn deploy(
        &self,
        service: &ServiceConfig,
        context: &ServiceContext,
        target: &TargetResource,
        progress: Option<ProgressReporter>,
    ) -> Result<DeployResult, ProviderError>;
}

#[async_trait]
pub trait FrameworkServiceProvider: Send + Sync {
    async fn initialize(&self, service: &ServiceConfig) -> Result<(), ProviderError>;

    /// Returns the produced build artifacts.
    async fn build(
        &self,
        service: &ServiceConfig,
        context: &ServiceContext,
        progress: Option<ProgressReporter>,
    ) -> Result<Vec<String>, ProviderError>;

    /// Returns the produced package artifacts.
    async fn package(
        &self,
        service: &ServiceConfig,
        context: &ServiceContext,
        progress: Option<ProgressReporter>,
    ) -> Result<Vec<String>, ProviderError>;
}

#[async_trait]
pub trait ProvisioningProvider: Send + Sync {
    async fn initialize(
        &self,
        project_path: &str,
        options: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError>;

    async fn deploy(
        &self,
        environment: &str,
        progress: Option<ProgressReporter>,
    ) -> Result<ProvisionOutputs, ProviderError>;

    /// Returns the output names invalidated by the teardown.
    async fn destroy(&self, environment: &str, purge: bool) -> Result<Vec<String>, ProviderError>;
}
