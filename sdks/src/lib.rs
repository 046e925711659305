// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

/// exthost Rust SDK
///
/// Build extensions that connect back to an exthost server: register
/// providers, answer lifecycle hooks, and prompt through the host console.

pub mod app;
pub mod client;
pub mod error;
pub mod events;
pub mod provider;

pub use app::ExtensionApp;
pub use client::{AuthChannel, BearerAuth, ExtensionClient};
pub use error::SdkError;
pub use events::{EventHandlers, EventSession};
pub use provider::ProviderSession;
