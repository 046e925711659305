// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod adapters;
pub mod broker;
pub mod convert;
pub mod envelopes;
pub mod extension_catalog;
pub mod factories;
pub mod pending;
pub mod prompt_lock;
pub mod proto;
pub mod provider_registry;
pub mod runner;
pub mod token;

pub use broker::{BrokerError, Envelope, HandlerContext, MessageBroker};
pub use extension_catalog::InMemoryExtensionRepository;
pub use pending::{Delivery, PendingCall, PendingCallError, PendingCalls};
pub use prompt_lock::{PromptGuard, PromptLock, PromptLockError};
pub use provider_registry::{ProviderRegistry, RegistrationGuard, RegistryError};
pub use token::{TokenCodec, TokenError};
