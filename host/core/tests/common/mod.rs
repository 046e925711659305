// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the end-to-end host tests: a host bound to loopback,
//! bearer-token client channels, and a scripted console.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

use exthost_core::domain::capability::CapabilityKind;
use exthost_core::domain::console::{Console, ConsoleError};
use exthost_core::domain::extension::ExtensionIdentity;
use exthost_core::domain::project::{ProjectConfig, ServiceConfig, StaticProjectSource};
use exthost_core::infrastructure::extension_catalog::InMemoryExtensionRepository;
use exthost_core::presentation::grpc::{bearer, AUTHORIZATION_HEADER};
use exthost_core::{ExtensionHost, RunningHost};

pub fn extension(id: &str, capabilities: &[CapabilityKind]) -> ExtensionIdentity {
    capabilities
        .iter()
        .fold(ExtensionIdentity::new(id), |ext, cap| ext.with_capability(*cap))
}

pub fn sample_project() -> ProjectConfig {
    let mut services = BTreeMap::new();
    services.insert(
        "api".to_string(),
        ServiceConfig {
            name: "api".into(),
            language: "python".into(),
            host: "containerapp".into(),
            relative_path: "src/api".into(),
            properties: BTreeMap::new(),
        },
    );
    services.insert(
        "web".to_string(),
        ServiceConfig {
            name: "web".into(),
            language: "js".into(),
            host: "staticwebapp".into(),
            relative_path: "src/web".into(),
            properties: BTreeMap::new(),
        },
    );
    ProjectConfig {
        name: "todo".into(),
        services,
    }
}

pub async fn start_host(extensions: Vec<ExtensionIdentity>) -> RunningHost {
    start_host_with_console(extensions, Arc::new(ScriptedConsole::default())).await
}

pub async fn start_host_with_console(
    extensions: Vec<ExtensionIdentity>,
    console: Arc<dyn Console>,
) -> RunningHost {
    ExtensionHost::new(
        Arc::new(InMemoryExtensionRepository::from_extensions(extensions)),
        Arc::new(StaticProjectSource::new(Some(sample_project()))),
        console,
    )
    .start()
    .await
    .unwrap()
}

pub async fn channel(host: &RunningHost) -> Channel {
    Channel::from_shared(host.server_info().endpoint_uri())
        .unwrap()
        .connect()
        .await
        .unwrap()
}

/// Attaches `authorization: Bearer <token>` to every call.
#[derive(Clone)]
pub struct BearerToken(MetadataValue<Ascii>);

impl BearerToken {
    pub fn new(token: &str) -> Self {
        Self(bearer(token).parse().unwrap())
    }

    pub fn for_extension(host: &RunningHost, id: &str) -> Self {
        Self::new(&host.mint_token_for(id).unwrap())
    }
}

impl Interceptor for BearerToken {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, self.0.clone());
        Ok(request)
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Console that answers with defaults after a short delay and records how
/// many prompts were ever active at once.
#[derive(Default)]
pub struct ScriptedConsole {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedConsole {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn interact(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    async fn confirm(&self, _message: &str, default: Option<bool>) -> Result<bool, ConsoleError> {
        self.interact().await;
        Ok(default.unwrap_or(true))
    }

    async fn prompt(&self, message: &str, default: &str, _secret: bool) -> Result<String, ConsoleError> {
        self.interact().await;
        if message == "cancel" {
            return Err(ConsoleError::Cancelled);
        }
        Ok(if default.is_empty() {
            format!("answer to {message}")
        } else {
            default.to_string()
        })
    }

    async fn select(
        &self,
        _message: &str,
        _choices: &[String],
        default: Option<usize>,
    ) -> Result<usize, ConsoleError> {
        self.interact().await;
        Ok(default.unwrap_or(0))
    }
}
