// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Extension Capabilities
//!
//! A [`CapabilityKind`] is a named permission an extension declares in its
//! installation record and carries in its access token. Every streaming RPC
//! on the host is gated by exactly one capability:
//!
//! | RPC | Required capability |
//! |-----|---------------------|
//! | `ServiceTargetService.Stream` | `service-target-provider` |
//! | `FrameworkService.Stream` | `framework-service-provider` |
//! | `ProvisioningService.Stream` | `provisioning-provider` |
//! | `EventService.EventStream` | `lifecycle-events` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named permission declared by an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    CustomCommands,
    LifecycleEvents,
    McpServer,
    ServiceTargetProvider,
    FrameworkServiceProvider,
    ProvisioningProvider,
    Metadata,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 7] = [
        CapabilityKind::CustomCommands,
        CapabilityKind::LifecycleEvents,
        CapabilityKind::McpServer,
        CapabilityKind::ServiceTargetProvider,
        CapabilityKind::FrameworkServiceProvider,
        CapabilityKind::ProvisioningProvider,
        CapabilityKind::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::CustomCommands => "custom-commands",
            CapabilityKind::LifecycleEvents => "lifecycle-events",
            CapabilityKind::McpServer => "mcp-server",
            CapabilityKind::ServiceTargetProvider => "service-target-provider",
            CapabilityKind::FrameworkServiceProvider => "framework-service-provider",
            CapabilityKind::ProvisioningProvider => "provisioning-provider",
            CapabilityKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown capability '{0}'")]
pub struct UnknownCapability(pub String);

impl FromStr for CapabilityKind {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// The three provider kinds an extension can register over a streaming RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    ServiceTarget,
    FrameworkService,
    Provisioning,
}

impl ProviderKind {
    /// Capability an extension must declare to open this provider stream.
    pub fn required_capability(&self) -> CapabilityKind {
        match self {
            ProviderKind::ServiceTarget => CapabilityKind::ServiceTargetProvider,
            ProviderKind::FrameworkService => CapabilityKind::FrameworkServiceProvider,
            ProviderKind::Provisioning => CapabilityKind::ProvisioningProvider,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::ServiceTarget => "service_target",
            ProviderKind::FrameworkService => "framework_service",
            ProviderKind::Provisioning => "provisioning",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_round_trips_through_kebab_case() {
        for kind in CapabilityKind::ALL {
            assert_eq!(kind.as_str().parse::<CapabilityKind>().unwrap(), kind);
            let yaml = serde_yaml::to_string(&kind).unwrap();
            assert_eq!(yaml.trim(), kind.as_str());
        }
    }

    #[test]
    fn test_unknown_capability_is_rejected() {
        assert!("teleport".parse::<CapabilityKind>().is_err());
    }

    #[test]
    fn test_provider_kind_capability_mapping() {
        assert_eq!(
            ProviderKind::ServiceTarget.required_capability(),
            CapabilityKind::ServiceTargetProvider
        );
        assert_eq!(
            ProviderKind::FrameworkService.required_capability(),
            CapabilityKind::FrameworkServiceProvider
        );
        assert_eq!(
            ProviderKind::Provisioning.required_capability(),
            CapabilityKind::ProvisioningProvider
        );
    }
}
