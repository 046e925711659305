// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Extension Claims
//!
//! Signed payload binding an extension id and its capabilities to one host
//! instance (`aud`) for a bounded window (`iat`..`exp`).
//!
//! After the auth interceptor verifies a token it attaches a
//! [`RequestIdentity`] to the request extensions. Handlers read that value
//! once and pass it down explicitly instead of re-parsing metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::capability::CapabilityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionClaims {
    /// Extension id.
    pub sub: String,
    pub iss: String,
    /// Server addresses the token is valid against; always exactly one.
    pub aud: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub capabilities: BTreeSet<CapabilityKind>,
}

/// Immutable caller identity resolved once by the auth interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    claims: ExtensionClaims,
}

impl RequestIdentity {
    pub fn new(claims: ExtensionClaims) -> Self {
        Self { claims }
    }

    pub fn extension_id(&self) -> &str {
        &self.claims.sub
    }

    pub fn claims(&self) -> &ExtensionClaims {
        &self.claims
    }

    pub fn has_capability(&self, capability: CapabilityKind) -> bool {
        self.claims.capabilities.contains(&capability)
    }
}
