// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Server Info
//!
//! Identity of one running host instance: the loopback address extensions
//! dial and the per-process signing key tokens are minted with. A fresh key
//! is generated on every start and never persisted, so a token minted by one
//! host process is worthless against any other.

use rand_core::{OsRng, RngCore};
use std::fmt;

/// 128-bit symmetric key used to sign and verify extension tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; 16]);

impl SigningKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// `host:port` the gRPC listener is bound to; also the token audience.
    pub address: String,
    pub port: u16,
    pub signing_key: SigningKey,
}

impl ServerInfo {
    pub fn new(address: impl Into<String>, port: u16, signing_key: SigningKey) -> Self {
        Self {
            address: address.into(),
            port,
            signing_key,
        }
    }

    /// Loopback server info with a freshly generated key.
    pub fn loopback(port: u16) -> Self {
        Self::new(format!("127.0.0.1:{port}"), port, SigningKey::generate())
    }

    pub fn endpoint_uri(&self) -> String {
        format!("http://{}", self.address)
    }
}
