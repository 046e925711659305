// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Wire Envelopes
//!
//! [`Envelope`] implementations for the generated stream messages, plus
//! [`ProviderEnvelope`], the extra surface the registration handshake needs
//! from the three provider stream message types.

use chrono::Utc;

use crate::domain::capability::ProviderKind;
use crate::infrastructure::broker::Envelope;
use crate::infrastructure::proto::{
    self, event_message, framework_service_message, provisioning_message, service_target_message,
    EventMessage, ExtensionError, FrameworkServiceMessage, ProgressMessage, ProvisioningMessage,
    ServiceTargetMessage,
};

/// Broker kind of every provider registration request.
pub const REGISTER_REQUEST: &str = "register_request";

/// Provider stream message carrying a registration handshake.
pub trait ProviderEnvelope: Envelope + Default {
    const KIND: ProviderKind;

    /// Provider key if this is a registration request.
    fn registration_key(&self) -> Option<String>;

    fn registration_ack(request_id: &str) -> Self;

    fn registration_request(key: &str) -> Self;
}

macro_rules! provider_envelope {
    (
        $msg:ident, $oneof:ident, $kind:expr,
        register: $register_req:ident { $key:ident }, $register_resp:ident,
        variants: { $($variant:ident => $name:literal),* $(,)? }
    ) => {
        impl Envelope for $msg {
            fn kind(&self) -> &'static str {
                use $oneof::MessageType;
                match &self.message_type {
                    Some(MessageType::RegisterRequest(_)) => REGISTER_REQUEST,
                    Some(MessageType::RegisterResponse(_)) => "register_response",
                    Some(MessageType::ProgressMessage(_)) => "progress_message",
                    $(Some(MessageType::$variant(_)) => $name,)*
                    None => "empty",
                }
            }

            fn request_id(&self) -> &str {
                &self.request_id
            }

            fn set_request_id(&mut self, request_id: &str) {
                self.request_id = request_id.to_string();
            }

            fn error_message(&self) -> Option<String> {
                self.error
                    .as_ref()
                    .filter(|e| !e.message.is_empty())
                    .map(|e| e.message.clone())
            }

            fn error_response(request_id: &str, message: &str) -> Option<Self> {
                Some(Self {
                    request_id: request_id.to_string(),
                    error: Some(ExtensionError {
                        message: message.to_string(),
                        code: String::new(),
                    }),
                    message_type: None,
                })
            }

            fn progress_text(&self) -> Option<&str> {
                match &self.message_type {
                    Some($oneof::MessageType::ProgressMessage(p)) => Some(&p.message),
                    _ => None,
                }
            }

            fn progress(request_id: &str, message: &str) -> Option<Self> {
                Some(Self {
                    request_id: request_id.to_string(),
                    error: None,
                    message_type: Some($oneof::MessageType::ProgressMessage(ProgressMessage {
                        message: message.to_string(),
                        timestamp: Utc::now().timestamp(),
                    })),
                })
            }
        }

        impl ProviderEnvelope for $msg {
            const KIND: ProviderKind = $kind;

            fn registration_key(&self) -> Option<String> {
                match &self.message_type {
                    Some($oneof::MessageType::RegisterRequest(req)) => Some(req.$key.clone()),
                    _ => None,
                }
            }

            fn registration_ack(request_id: &str) -> Self {
                Self {
                    request_id: request_id.to_string(),
                    error: None,
                    message_type: Some($oneof::MessageType::RegisterResponse(
                        proto::$register_resp {},
                    )),
                }
            }

            fn registration_request(key: &str) -> Self {
                Self {
                    request_id: String::new(),
                    error: None,
                    message_type: Some($oneof::MessageType::RegisterRequest(proto::$register_req {
                        $key: key.to_string(),
                    })),
                }
            }
        }
    };
}

provider_envelope!(
    ServiceTargetMessage, service_target_message, ProviderKind::ServiceTarget,
    register: RegisterServiceTargetRequest { host }, RegisterServiceTargetResponse,
    variants: {
        InitializeRequest => "initialize_request",
        InitializeResponse => "initialize_response",
        EndpointsRequest => "endpoints_request",
        EndpointsResponse => "endpoints_response",
        DeployRequest => "deploy_request",
        DeployResponse => "deploy_response",
    }
);

provider_envelope!(
    FrameworkServiceMessage, framework_service_message, ProviderKind::FrameworkService,
    register: RegisterFrameworkServiceRequest { language }, RegisterFrameworkServiceResponse,
    variants: {
        InitializeRequest => "initialize_request",
        InitializeResponse => "initialize_response",
        BuildRequest => "build_request",
        BuildResponse => "build_response",
        PackageRequest => "package_request",
        PackageResponse => "package_response",
    }
);

provider_envelope!(
    ProvisioningMessage, provisioning_message, ProviderKind::Provisioning,
    register: RegisterProvisioningProviderRequest { name }, RegisterProvisioningProviderResponse,
    variants: {
        InitializeRequest => "initialize_request",
        InitializeResponse => "initialize_response",
        DeployRequest => "deploy_request",
        DeployResponse => "deploy_response",
        DestroyRequest => "destroy_request",
        DestroyResponse => "destroy_response",
    }
);

impl Envelope for EventMessage {
    fn kind(&self) -> &'static str {
        use event_message::MessageType;
        match &self.message_type {
            Some(MessageType::SubscribeProjectEvent(_)) => "subscribe_project_event",
            Some(MessageType::InvokeProjectHandler(_)) => "invoke_project_handler",
            Some(MessageType::ProjectHandlerStatus(_)) => "project_handler_status",
            Some(MessageType::SubscribeServiceEvent(_)) => "subscribe_service_event",
            Some(MessageType::InvokeServiceHandler(_)) => "invoke_service_handler",
            Some(MessageType::ServiceHandlerStatus(_)) => "service_handler_status",
            Some(MessageType::ExtensionReadyEvent(_)) => "extension_ready_event",
            None => "empty",
        }
    }
}

impl EventMessage {
    pub fn of(message_type: event_message::MessageType) -> Self {
        Self {
            message_type: Some(message_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_round_trip() {
        let request = FrameworkServiceMessage::registration_request("python");
        assert_eq!(request.kind(), REGISTER_REQUEST);
        assert_eq!(request.registration_key().as_deref(), Some("python"));

        let ack = FrameworkServiceMessage::registration_ack("r-1");
        assert_eq!(ack.kind(), "register_response");
        assert_eq!(ack.request_id(), "r-1");
        assert_eq!(ack.registration_key(), None);
    }

    #[test]
    fn test_error_response_carries_message() {
        let msg = ServiceTargetMessage::error_response("r-2", "boom").unwrap();
        assert_eq!(msg.error_message().as_deref(), Some("boom"));
        assert_eq!(msg.kind(), "empty");

        let ok = ServiceTargetMessage::default();
        assert_eq!(ok.error_message(), None);
    }

    #[test]
    fn test_progress_envelope() {
        let msg = ProvisioningMessage::progress("r-3", "creating resource group").unwrap();
        assert_eq!(msg.kind(), "progress_message");
        assert_eq!(msg.progress_text(), Some("creating resource group"));
    }
}
