// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::error::SdkError;
use exthost_core::domain::project::ProjectConfig;
use exthost_core::infrastructure::proto::event_service_client::EventServiceClient;
use exthost_core::infrastructure::proto::framework_service_client::FrameworkServiceClient;
use exthost_core::infrastructure::proto::project_service_client::ProjectServiceClient;
use exthost_core::infrastructure::proto::prompt_service_client::PromptServiceClient;
use exthost_core::infrastructure::proto::provisioning_service_client::ProvisioningServiceClient;
use exthost_core::infrastructure::proto::service_target_service_client::ServiceTargetServiceClient;
use exthost_core::infrastructure::proto::{ConfirmRequest, GetProjectRequest, PromptRequest, SelectRequest};
use exthost_core::infrastructure::runner::{ACCESS_TOKEN_ENV, SERVER_ENV};
use exthost_core::presentation::grpc::{bearer, AUTHORIZATION_HEADER};

/// Adds the extension's access token to every outgoing call.
#[derive(Clone)]
pub struct BearerAuth(MetadataValue<Ascii>);

impl BearerAuth {
    pub fn new(token: &str) -> Result<Self, SdkError> {
        bearer(token)
            .parse()
            .map(Self)
            .map_err(|_| SdkError::InvalidToken)
    }
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, self.0.clone());
        Ok(request)
    }
}

pub type AuthChannel = InterceptedService<Channel, BearerAuth>;

/// Connection from an extension back to its host.
#[derive(Clone)]
pub struct ExtensionClient {
    server: String,
    channel: Channel,
    auth: BearerAuth,
}

impl ExtensionClient {
    /// Connect using the address and token the host put in the environment.
    pub async fn from_env() -> Result<Self, SdkError> {
        let server = std::env::var(SERVER_ENV).map_err(|_| SdkError::MissingEnv(SERVER_ENV))?;
        let token =
            std::env::var(ACCESS_TOKEN_ENV).map_err(|_| SdkError::MissingEnv(ACCESS_TOKEN_ENV))?;
        Self::connect(&server, &token).await
    }

    pub async fn connect(server: &str, token: &str) -> Result<Self, SdkError> {
        let uri = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{server}")
        };
        let channel = Channel::from_shared(uri)
            .map_err(|_| SdkError::InvalidServer(server.to_string()))?
            .connect()
            .await?;

        tracing::debug!(server = %server, "Connected to extension host");
        Ok(Self {
            server: server.to_string(),
            channel,
            auth: BearerAuth::new(token)?,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn service_targets(&self) -> ServiceTargetServiceClient<AuthChannel> {
        ServiceTargetServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    pub fn framework_services(&self) -> FrameworkServiceClient<AuthChannel> {
        FrameworkServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    pub fn provisioning(&self) -> ProvisioningServiceClient<AuthChannel> {
        ProvisioningServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    pub fn events(&self) -> EventServiceClient<AuthChannel> {
        EventServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    pub fn prompts(&self) -> PromptServiceClient<AuthChannel> {
        PromptServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    /// Ask the user a yes/no question on the host's console.
    pub async fn confirm(&self, message: &str, default: Option<bool>) -> Result<bool, SdkError> {
        let response = self
            .prompts()
            .confirm(ConfirmRequest {
                message: message.to_string(),
                default_value: default,
            })
            .await?;
        Ok(response.into_inner().value)
    }

    pub async fn prompt(&self, message: &str, default: &str, secret: bool) -> Result<String, SdkError> {
        let response = self
            .prompts()
            .prompt(PromptRequest {
                message: message.to_string(),
                default_value: default.to_string(),
                secret,
            })
            .await?;
        Ok(response.into_inner().value)
    }

    pub async fn select(
        &self,
        message: &str,
        choices: &[String],
        default: Option<usize>,
    ) -> Result<usize, SdkError> {
        let response = self
            .prompts()
            .select(SelectRequest {
                message: message.to_string(),
                choices: choices.to_vec(),
                default_index: default.map(|i| i as u32),
            })
            .await?;
        Ok(response.into_inner().index as usize)
    }

    /// The host's current project.
    pub async fn project(&self) -> Result<ProjectConfig, SdkError> {
        let response = ProjectServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
            .get(GetProjectRequest {})
            .await?
            .into_inner();
        response
            .project
            .map(ProjectConfig::from)
            .ok_or(SdkError::UnexpectedMessage("empty project"))
    }
}
