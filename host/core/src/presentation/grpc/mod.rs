// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Tonic service implementations for the extension host.
//!
//! # Architecture
//!
//! - **Layer:** Presentation Layer
//! - **Purpose:** Implements the gRPC endpoints and server lifecycle

pub mod auth;
pub mod event_service;
pub mod project_service;
pub mod prompt_service;
pub mod provider_services;
pub mod server;

pub use auth::{bearer, AuthInterceptor, AUTHORIZATION_HEADER};
pub use server::{ExtensionHost, HostState, RunningHost, ServerError};
