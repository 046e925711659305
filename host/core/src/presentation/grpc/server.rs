// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Extension Host Server
//!
//! Binds the loopback listener, generates the per-instance [`ServerInfo`],
//! and serves every extension-facing service behind the bearer-token
//! interceptor. [`ExtensionHost`] configures a host; [`RunningHost`] is the
//! handle the rest of the process uses to mint tokens, launch extensions,
//! resolve registered providers and raise lifecycle events.
//!
//! Shutdown cancels a single token shared by every broker loop. Each loop
//! exits, its registration guard drops, and the registries empty themselves.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::auth::AuthInterceptor;
use super::event_service::EventEndpoint;
use super::project_service::ProjectEndpoint;
use super::prompt_service::PromptEndpoint;
use super::provider_services::{FrameworkServiceEndpoint, ProvisioningEndpoint, ServiceTargetEndpoint};
use crate::application::event_bridge::EventBridge;
use crate::application::lifecycle::LifecycleDispatcher;
use crate::application::readiness::{ReadinessBoard, ReadinessError};
use crate::application::registration::RegistrationService;
use crate::domain::capability::ProviderKind;
use crate::domain::console::Console;
use crate::domain::extension::{ExtensionIdentity, ExtensionLookupError, ExtensionRepository};
use crate::domain::host_config::{HostConfig, ServerSettings};
use crate::domain::project::{ProjectSource, StaticProjectSource};
use crate::domain::provider::{FrameworkServiceProvider, ProvisioningProvider, ServiceTargetProvider};
use crate::domain::server_info::{ServerInfo, SigningKey};
use crate::infrastructure::extension_catalog::InMemoryExtensionRepository;
use crate::infrastructure::factories::ProviderFactories;
use crate::infrastructure::prompt_lock::PromptLock;
use crate::infrastructure::proto::event_service_server::EventServiceServer;
use crate::infrastructure::proto::framework_service_server::FrameworkServiceServer;
use crate::infrastructure::proto::project_service_server::ProjectServiceServer;
use crate::infrastructure::proto::prompt_service_server::PromptServiceServer;
use crate::infrastructure::proto::provisioning_service_server::ProvisioningServiceServer;
use crate::infrastructure::proto::service_target_service_server::ServiceTargetServiceServer;
use crate::infrastructure::provider_registry::ProviderRegistry;
use crate::infrastructure::runner::{ExtensionRunner, RunnerError, RunningExtension};
use crate::infrastructure::token::{TokenCodec, TokenError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Extension(#[from] ExtensionLookupError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),
}

/// Collaborators shared by every service endpoint.
pub struct HostState {
    pub settings: ServerSettings,
    pub registration: RegistrationService,
    pub service_targets: ProviderRegistry<dyn ServiceTargetProvider>,
    pub framework_services: ProviderRegistry<dyn FrameworkServiceProvider>,
    pub provisioning_providers: ProviderRegistry<dyn ProvisioningProvider>,
    pub factories: ProviderFactories,
    pub event_bridge: EventBridge,
    pub readiness: Arc<ReadinessBoard>,
    pub prompt_lock: PromptLock,
    pub console: Arc<dyn Console>,
    pub project: Arc<dyn ProjectSource>,
    pub extensions: Arc<dyn ExtensionRepository>,
}

/// Host configuration prior to binding.
pub struct ExtensionHost {
    settings: ServerSettings,
    extensions: Arc<dyn ExtensionRepository>,
    project: Arc<dyn ProjectSource>,
    console: Arc<dyn Console>,
    factories: ProviderFactories,
    lifecycle: LifecycleDispatcher,
}

impl ExtensionHost {
    pub fn new(
        extensions: Arc<dyn ExtensionRepository>,
        project: Arc<dyn ProjectSource>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            settings: ServerSettings::default(),
            extensions,
            project,
            console,
            factories: ProviderFactories::default(),
            lifecycle: LifecycleDispatcher::new(),
        }
    }

    /// Host whose extension catalog and project come from `config`.
    pub fn from_config(config: &HostConfig, console: Arc<dyn Console>) -> Self {
        let extensions = Arc::new(InMemoryExtensionRepository::from_extensions(
            config.extensions.iter().cloned(),
        ));
        let project = Arc::new(StaticProjectSource::new(config.normalized_project()));
        Self::new(extensions, project, console).with_settings(config.server.clone())
    }

    pub fn with_settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_factories(mut self, factories: ProviderFactories) -> Self {
        self.factories = factories;
        self
    }

    /// Share an existing dispatcher, e.g. one that already carries in-host handlers.
    pub fn with_lifecycle(mut self, lifecycle: LifecycleDispatcher) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Bind `127.0.0.1:0` and start serving.
    pub async fn start(self) -> Result<RunningHost, ServerError> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .map_err(ServerError::Bind)?;
        let local = listener.local_addr().map_err(ServerError::Bind)?;
        let server_info = Arc::new(ServerInfo::new(
            local.to_string(),
            local.port(),
            SigningKey::generate(),
        ));

        let codec = TokenCodec::new(self.settings.issuer.clone(), self.settings.token_ttl());
        let shutdown = CancellationToken::new();

        let state = Arc::new(HostState {
            registration: RegistrationService::new(
                self.extensions.clone(),
                self.settings.broker_response_buffer,
                shutdown.clone(),
            ),
            service_targets: ProviderRegistry::new(ProviderKind::ServiceTarget),
            framework_services: ProviderRegistry::new(ProviderKind::FrameworkService),
            provisioning_providers: ProviderRegistry::new(ProviderKind::Provisioning),
            factories: self.factories,
            event_bridge: EventBridge::new(self.lifecycle, self.project.clone()),
            readiness: Arc::new(ReadinessBoard::new()),
            prompt_lock: PromptLock::new(),
            console: self.console,
            project: self.project,
            extensions: self.extensions,
            settings: self.settings,
        });

        let interceptor = AuthInterceptor::new(codec.clone(), server_info.clone());
        let router = tonic::transport::Server::builder()
            .add_service(ServiceTargetServiceServer::with_interceptor(
                ServiceTargetEndpoint::new(state.clone()),
                interceptor.clone(),
            ))
            .add_service(FrameworkServiceServer::with_interceptor(
                FrameworkServiceEndpoint::new(state.clone()),
                interceptor.clone(),
            ))
            .add_service(ProvisioningServiceServer::with_interceptor(
                ProvisioningEndpoint::new(state.clone()),
                interceptor.clone(),
            ))
            .add_service(EventServiceServer::with_interceptor(
                EventEndpoint::new(state.clone()),
                interceptor.clone(),
            ))
            .add_service(PromptServiceServer::with_interceptor(
                PromptEndpoint::new(state.clone()),
                interceptor.clone(),
            ))
            .add_service(ProjectServiceServer::with_interceptor(
                ProjectEndpoint::new(state.clone()),
                interceptor,
            ));

        let signal = shutdown.clone();
        let server = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    signal.cancelled().await
                })
                .await
        });

        info!(address = %server_info.address, "Extension host listening");

        Ok(RunningHost {
            state,
            server_info,
            codec,
            shutdown,
            server: Some(server),
        })
    }
}

/// A serving host. Dropping it stops the server without waiting.
pub struct RunningHost {
    state: Arc<HostState>,
    server_info: Arc<ServerInfo>,
    codec: TokenCodec,
    shutdown: CancellationToken,
    server: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
}

impl RunningHost {
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Access token for `extension`, bound to this server instance.
    pub fn mint_token(&self, extension: &ExtensionIdentity) -> Result<String, ServerError> {
        Ok(self.codec.generate(extension, &self.server_info)?)
    }

    /// Access token for an installed extension.
    pub fn mint_token_for(&self, extension_id: &str) -> Result<String, ServerError> {
        let extension = self.state.extensions.get_installed(extension_id)?;
        self.mint_token(&extension)
    }

    pub fn extensions(&self) -> Vec<ExtensionIdentity> {
        self.state.extensions.list_installed()
    }

    pub fn service_target(&self, host: &str) -> Option<Arc<dyn ServiceTargetProvider>> {
        self.state.service_targets.get(host)
    }

    pub fn framework_service(&self, language: &str) -> Option<Arc<dyn FrameworkServiceProvider>> {
        self.state.framework_services.get(language)
    }

    pub fn provisioning_provider(&self, name: &str) -> Option<Arc<dyn ProvisioningProvider>> {
        self.state.provisioning_providers.get(name)
    }

    pub fn service_targets(&self) -> &ProviderRegistry<dyn ServiceTargetProvider> {
        &self.state.service_targets
    }

    pub fn framework_services(&self) -> &ProviderRegistry<dyn FrameworkServiceProvider> {
        &self.state.framework_services
    }

    pub fn provisioning_providers(&self) -> &ProviderRegistry<dyn ProvisioningProvider> {
        &self.state.provisioning_providers
    }

    pub fn lifecycle(&self) -> &LifecycleDispatcher {
        self.state.event_bridge.dispatcher()
    }

    pub fn event_bridge(&self) -> &EventBridge {
        &self.state.event_bridge
    }

    pub fn readiness(&self) -> &ReadinessBoard {
        &self.state.readiness
    }

    /// Cancelled when the host begins shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Launch an installed extension with a freshly minted token.
    pub fn spawn_extension(&self, extension_id: &str) -> Result<RunningExtension, ServerError> {
        let extension = self.state.extensions.get_installed(extension_id)?;
        let token = self.mint_token(&extension)?;
        self.state.readiness.reset(extension_id);
        Ok(ExtensionRunner::new(self.server_info.address.clone()).spawn(&extension, &token)?)
    }

    /// Wait until `extension_id` reports ready, bounded by the configured timeout.
    pub async fn wait_ready(&self, extension_id: &str) -> Result<(), ServerError> {
        self.state
            .readiness
            .wait_ready(extension_id, self.state.settings.readiness_timeout())
            .await?;
        info!(extension_id = %extension_id, "Extension ready");
        Ok(())
    }

    /// Stop accepting connections, end every broker loop and wait for the
    /// server task.
    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        info!(address = %self.server_info.address, "Shutting down extension host");
        self.shutdown.cancel();
        if let Some(server) = self.server.take() {
            server.await??;
        }
        Ok(())
    }
}

impl Drop for RunningHost {
    fn drop(&mut self) {
        if self.server.is_some() {
            warn!(address = %self.server_info.address, "Extension host dropped without shutdown");
            self.shutdown.cancel();
        }
    }
}
