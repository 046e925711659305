// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`exthost-core`)
//!
//! gRPC surface extensions connect to. **No business logic lives here**; the
//! endpoints authenticate, authorize and hand off to application services in
//! `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`grpc`] | gRPC (Tonic) | Provider streams, event stream, prompt and project services |

pub mod grpc;
