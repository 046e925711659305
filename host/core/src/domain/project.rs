// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Project Model
//!
//! The slice of project configuration the extension substrate needs: service
//! identity (for service-scoped hooks and subscription filters) and the
//! context passed along with lifecycle invocations. Persistence of the
//! project file lives outside this crate; the host only reads it through
//! [`ProjectSource`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub relative_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl ProjectConfig {
    /// Services whose language and host match the (optional) filter.
    /// An empty filter field matches everything.
    pub fn matching_services<'a>(
        &'a self,
        filter: &'a ServiceFilter,
    ) -> impl Iterator<Item = (&'a String, &'a ServiceConfig)> + 'a {
        self.services.iter().filter(move |(_, svc)| filter.matches(svc))
    }
}

/// Narrows a service-event subscription by language and/or host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    pub language: Option<String>,
    pub host: Option<String>,
}

impl ServiceFilter {
    pub fn new(language: &str, host: &str) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            language: non_empty(language),
            host: non_empty(host),
        }
    }

    pub fn matches(&self, service: &ServiceConfig) -> bool {
        let language_ok = self.language.as_deref().is_none_or(|l| l == service.language);
        let host_ok = self.host.as_deref().is_none_or(|h| h == service.host);
        language_ok && host_ok
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    #[serde(default)]
    pub build_artifacts: Vec<String>,
    #[serde(default)]
    pub package_artifacts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    pub subscription_id: String,
    pub resource_group: String,
    pub resource_name: String,
    pub resource_type: String,
}

/// Arguments of a project-scoped lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEventArgs {
    pub project: ProjectConfig,
}

/// Arguments of a service-scoped lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEventArgs {
    pub project: ProjectConfig,
    pub service: ServiceConfig,
    pub service_context: ServiceContext,
}

/// Read access to the current project configuration.
pub trait ProjectSource: Send + Sync {
    fn project(&self) -> Option<ProjectConfig>;
}

/// Fixed project handed to the host at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticProjectSource {
    project: Option<ProjectConfig>,
}

impl StaticProjectSource {
    pub fn new(project: Option<ProjectConfig>) -> Self {
        Self { project }
    }
}

impl ProjectSource for StaticProjectSource {
    fn project(&self) -> Option<ProjectConfig> {
        self.project.clone()
    }
}
