// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Remote Provider Adapters
//!
//! Host-side implementations of the provider traits that forward every call
//! over the extension's registered stream and translate the correlated reply.

mod framework_service;
mod provisioning;
mod service_target;

pub use framework_service::RemoteFrameworkService;
pub use provisioning::RemoteProvisioningProvider;
pub use service_target::RemoteServiceTarget;

use crate::domain::provider::ProviderError;
use crate::infrastructure::broker::BrokerError;

fn provider_error(err: BrokerError) -> ProviderError {
    match err {
        BrokerError::Remote(message) => ProviderError::Remote(message),
        _ => ProviderError::Disconnected,
    }
}
