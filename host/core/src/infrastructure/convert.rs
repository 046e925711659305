// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Conversions between domain project types and their wire representation.

use crate::domain::project::{ProjectConfig, ServiceConfig, ServiceContext, TargetResource};
use crate::infrastructure::proto;

impl From<&ServiceConfig> for proto::ServiceConfig {
    fn from(service: &ServiceConfig) -> Self {
        Self {
            name: service.name.clone(),
            language: service.language.clone(),
            host: service.host.clone(),
            relative_path: service.relative_path.clone(),
            properties: service
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl From<proto::ServiceConfig> for ServiceConfig {
    fn from(service: proto::ServiceConfig) -> Self {
        Self {
            name: service.name,
            language: service.language,
            host: service.host,
            relative_path: service.relative_path,
            properties: service.properties.into_iter().collect(),
        }
    }
}

impl From<&ProjectConfig> for proto::ProjectConfig {
    fn from(project: &ProjectConfig) -> Self {
        Self {
            name: project.name.clone(),
            services: project
                .services
                .iter()
                .map(|(name, svc)| (name.clone(), svc.into()))
                .collect(),
        }
    }
}

impl From<proto::ProjectConfig> for ProjectConfig {
    fn from(project: proto::ProjectConfig) -> Self {
        Self {
            name: project.name,
            services: project
                .services
                .into_iter()
                .map(|(name, svc)| (name, svc.into()))
                .collect(),
        }
    }
}

impl From<&ServiceContext> for proto::ServiceContext {
    fn from(context: &ServiceContext) -> Self {
        Self {
            build_artifacts: context.build_artifacts.clone(),
            package_artifacts: context.package_artifacts.clone(),
        }
    }
}

impl From<proto::ServiceContext> for ServiceContext {
    fn from(context: proto::ServiceContext) -> Self {
        Self {
            build_artifacts: context.build_artifacts,
            package_artifacts: context.package_artifacts,
        }
    }
}

impl From<&TargetResource> for proto::TargetResource {
    fn from(target: &TargetResource) -> Self {
        Self {
            subscription_id: target.subscription_id.clone(),
            resource_group: target.resource_group.clone(),
            resource_name: target.resource_name.clone(),
            resource_type: target.resource_type.clone(),
        }
    }
}

impl From<proto::TargetResource> for TargetResource {
    fn from(target: proto::TargetResource) -> Self {
        Self {
            subscription_id: target.subscription_id,
            resource_group: target.resource_group,
            resource_name: target.resource_name,
            resource_type: target.resource_type,
        }
    }
}
