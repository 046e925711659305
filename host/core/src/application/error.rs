// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::capability::{CapabilityKind, ProviderKind};

/// Failure taxonomy surfaced to extensions across the RPC boundary.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HostError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("extension '{extension_id}' lacks capability '{capability}'")]
    Authorization {
        extension_id: String,
        capability: CapabilityKind,
    },

    #[error("{kind} provider '{key}' is already registered")]
    RegistrationConflict { kind: ProviderKind, key: String },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("extension '{0}' is not installed")]
    ExtensionNotFound(String),

    #[error("failed to register provider: {0}")]
    InternalRegistrationFailure(String),
}

impl From<HostError> for tonic::Status {
    fn from(err: HostError) -> Self {
        let message = err.to_string();
        match err {
            HostError::Authentication(_) => tonic::Status::unauthenticated(message),
            HostError::Authorization { .. } => tonic::Status::permission_denied(message),
            HostError::RegistrationConflict { .. } => tonic::Status::already_exists(message),
            HostError::ProtocolViolation(_) | HostError::ExtensionNotFound(_) => {
                tonic::Status::failed_precondition(message)
            }
            HostError::InternalRegistrationFailure(_) => tonic::Status::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        let cases = [
            (HostError::Authentication("expired".into()), Code::Unauthenticated),
            (
                HostError::Authorization {
                    extension_id: "x".into(),
                    capability: CapabilityKind::ServiceTargetProvider,
                },
                Code::PermissionDenied,
            ),
            (
                HostError::RegistrationConflict {
                    kind: ProviderKind::FrameworkService,
                    key: "python".into(),
                },
                Code::AlreadyExists,
            ),
            (HostError::ProtocolViolation("bad first message".into()), Code::FailedPrecondition),
            (HostError::ExtensionNotFound("x".into()), Code::FailedPrecondition),
            (HostError::InternalRegistrationFailure("boom".into()), Code::Internal),
        ];

        for (err, code) in cases {
            assert_eq!(tonic::Status::from(err).code(), code);
        }
    }
}
