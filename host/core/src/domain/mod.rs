// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Value types and collaborator interfaces shared by every layer: extension
//! identity and capabilities, token claims, server identity, the project
//! model, provider traits, and the console.

pub mod capability;
pub mod claims;
pub mod console;
pub mod extension;
pub mod host_config;
pub mod project;
pub mod provider;
pub mod server_info;
