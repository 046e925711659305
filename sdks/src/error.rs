// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use exthost_core::domain::capability::ProviderKind;
use exthost_core::infrastructure::broker::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("invalid server address '{0}'")]
    InvalidServer(String),

    #[error("access token cannot be sent as metadata")]
    InvalidToken,

    #[error("failed to connect to host: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("host returned {}: {}", .0.code(), .0.message())]
    Status(#[from] tonic::Status),

    #[error("{kind} registration for '{key}' rejected: {}", .status.message())]
    RegistrationRejected {
        kind: ProviderKind,
        key: String,
        status: tonic::Status,
    },

    #[error("unexpected '{0}' message from host")]
    UnexpectedMessage(&'static str),

    #[error("stream closed by host")]
    Closed,

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
