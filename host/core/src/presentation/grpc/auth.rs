// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bearer Token Interceptor
//!
//! Runs in front of every service. Requires an `authorization: Bearer <token>`
//! metadata entry, validates it against this host instance, and attaches the
//! resulting [`RequestIdentity`] to the request extensions. Handlers read the
//! identity with [`request_identity`] and never parse metadata themselves.

use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::debug;

use crate::application::error::HostError;
use crate::domain::claims::RequestIdentity;
use crate::domain::server_info::ServerInfo;
use crate::infrastructure::token::TokenCodec;

pub const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone)]
pub struct AuthInterceptor {
    codec: TokenCodec,
    server: Arc<ServerInfo>,
}

impl AuthInterceptor {
    pub fn new(codec: TokenCodec, server: Arc<ServerInfo>) -> Self {
        Self { codec, server }
    }

    fn authenticate<T>(&self, request: &Request<T>) -> Result<RequestIdentity, HostError> {
        let header = request
            .metadata()
            .get(AUTHORIZATION_HEADER)
            .ok_or_else(|| HostError::Authentication("missing authorization header".into()))?;

        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HostError::Authentication("expected a bearer token".into()))?;

        let claims = self
            .codec
            .validate(token, &self.server)
            .map_err(|e| HostError::Authentication(e.to_string()))?;

        Ok(RequestIdentity::new(claims))
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        match self.authenticate(&request) {
            Ok(identity) => {
                debug!(extension_id = %identity.extension_id(), "Request authenticated");
                request.extensions_mut().insert(identity);
                Ok(request)
            }
            Err(err) => {
                debug!(error = %err, "Rejecting unauthenticated request");
                Err(err.into())
            }
        }
    }
}

/// Identity attached by [`AuthInterceptor`].
pub fn request_identity<T>(request: &Request<T>) -> Result<RequestIdentity, Status> {
    request
        .extensions()
        .get::<RequestIdentity>()
        .cloned()
        .ok_or_else(|| Status::unauthenticated("request was not authenticated"))
}

/// `authorization` metadata value for `token`.
pub fn bearer(token: &str) -> String {
    format!("{BEARER_PREFIX}{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::CapabilityKind;
    use crate::domain::extension::ExtensionIdentity;
    use crate::domain::server_info::SigningKey;
    use tonic::Code;

    fn setup() -> (AuthInterceptor, String) {
        let server = Arc::new(ServerInfo::new(
            "127.0.0.1:5000",
            5000,
            SigningKey::from_bytes([3; 16]),
        ));
        let codec = TokenCodec::default();
        let ext = ExtensionIdentity::new("ext.a").with_capability(CapabilityKind::LifecycleEvents);
        let token = codec.generate(&ext, &server).unwrap();
        (AuthInterceptor::new(codec, server), token)
    }

    #[test]
    fn test_valid_bearer_attaches_identity() {
        let (mut interceptor, token) = setup();
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, bearer(&token).parse().unwrap());

        let request = interceptor.call(request).unwrap();
        let identity = request_identity(&request).unwrap();
        assert_eq!(identity.extension_id(), "ext.a");
        assert!(identity.has_capability(CapabilityKind::LifecycleEvents));
    }

    #[test]
    fn test_missing_or_bad_header_is_unauthenticated() {
        let (mut interceptor, token) = setup();

        let status = interceptor.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);

        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, token.parse().unwrap());
        assert_eq!(interceptor.call(request).unwrap_err().code(), Code::Unauthenticated);

        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(AUTHORIZATION_HEADER, "Bearer forged.token.value".parse().unwrap());
        assert_eq!(interceptor.call(request).unwrap_err().code(), Code::Unauthenticated);
    }
}
