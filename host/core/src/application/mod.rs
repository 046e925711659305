// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod error;
pub mod event_bridge;
pub mod lifecycle;
pub mod readiness;
pub mod registration;

pub use error::HostError;
pub use event_bridge::{EventBridge, EventBridgeError, HookChannel, HookStatus, STATUS_COMPLETED, STATUS_FAILED};
pub use lifecycle::{HandlerRegistration, LifecycleDispatcher, LifecycleError};
pub use readiness::{ReadinessBoard, ReadinessError, ReadyState};
pub use registration::RegistrationService;
