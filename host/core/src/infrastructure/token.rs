// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Token Codec
//!
//! Mints and verifies the HS256 access tokens handed to extensions. A token is
//! bound to one [`ServerInfo`]: it is signed with that instance's random key
//! and carries the instance address as its only audience.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Authentication boundary for every RPC the host serves

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::domain::claims::ExtensionClaims;
use crate::domain::extension::ExtensionIdentity;
use crate::domain::host_config::DEFAULT_ISSUER;
use crate::domain::server_info::ServerInfo;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token audience does not match this server")]
    InvalidAudience,

    #[error("token issuer is not trusted")]
    InvalidIssuer,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidAudience => TokenError::InvalidAudience,
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenCodec {
    issuer: String,
    ttl: Duration,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUER, std::time::Duration::from_secs(3600))
    }
}

impl TokenCodec {
    pub fn new(issuer: impl Into<String>, ttl: std::time::Duration) -> Self {
        Self {
            issuer: issuer.into(),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::hours(1)),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn generate(
        &self,
        extension: &ExtensionIdentity,
        server: &ServerInfo,
    ) -> Result<String, TokenError> {
        self.generate_with_issued_at(extension, server, Utc::now())
    }

    /// Mint a token with an explicit issue time; `exp` is `issued_at + ttl`.
    pub fn generate_with_issued_at(
        &self,
        extension: &ExtensionIdentity,
        server: &ServerInfo,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = ExtensionClaims {
            sub: extension.id.clone(),
            iss: self.issuer.clone(),
            aud: vec![server.address.clone()],
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
            capabilities: extension.capabilities.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(server.signing_key.as_bytes()),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, audience, issuer and expiry against `server`.
    pub fn validate(&self, token: &str, server: &ServerInfo) -> Result<ExtensionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[server.address.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;

        let data = decode::<ExtensionClaims>(
            token,
            &DecodingKey::from_secret(server.signing_key.as_bytes()),
            &validation,
        )?;

        // jsonwebtoken accepts exp == now; a token is only valid strictly before exp.
        if Utc::now().timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        // jsonwebtoken accepts any matching entry; this server must be the only audience.
        if data.claims.aud != [server.address.as_str()] {
            return Err(TokenError::InvalidAudience);
        }

        Ok(data.claims)
    }

    /// Read the claims without checking the signature.
    ///
    /// Only for learning the claimed subject; never authorize anything with it.
    pub fn extract_unverified(token: &str) -> Result<ExtensionClaims, TokenError> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(TokenError::Malformed("expected three segments".into())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}
