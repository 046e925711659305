// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Extension host substrate: out-of-process extensions connect back over
//! authenticated gRPC, register as providers, and subscribe to lifecycle
//! events.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Crate root for `exthost-core`

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
pub use presentation::grpc::server::{ExtensionHost, HostState, RunningHost, ServerError};
