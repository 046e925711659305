// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Registration
//!
//! The handshake shared by the three provider streams:
//!
//! 1. **Connected** – the interceptor has verified the token; the caller's
//!    [`RequestIdentity`] is resolved to an installed extension.
//! 2. **AwaitingRegistration** – the required capability is checked before
//!    any message is read, then the first message must be a registration
//!    request carrying a non-empty provider key.
//! 3. **Registered** – the key is claimed in the kind's registry, the
//!    capability adapter is built from the stream's broker, and the
//!    acknowledgement is sent. The broker then serves the stream.
//! 4. **Closed** – whatever ends the stream, dropping the registration guard
//!    frees the key exactly once.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Stream-to-registry state machine, independent of transport codegen

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{info, warn};

use crate::application::error::HostError;
use crate::domain::capability::{CapabilityKind, ProviderKind};
use crate::domain::claims::RequestIdentity;
use crate::domain::extension::{ExtensionIdentity, ExtensionLookupError, ExtensionRepository};
use crate::infrastructure::broker::{BrokerError, MessageBroker};
use crate::infrastructure::envelopes::{ProviderEnvelope, REGISTER_REQUEST};
use crate::infrastructure::factories::ProviderFactory;
use crate::infrastructure::provider_registry::{ProviderRegistry, RegistryError};

const STREAM_BUFFER: usize = 32;

/// Resolves callers to installed extensions and runs provider handshakes.
#[derive(Clone)]
pub struct RegistrationService {
    extensions: Arc<dyn ExtensionRepository>,
    response_buffer: usize,
    shutdown: CancellationToken,
}

impl RegistrationService {
    pub fn new(
        extensions: Arc<dyn ExtensionRepository>,
        response_buffer: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            extensions,
            response_buffer,
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// The installed extension behind `identity`, provided both the token and
    /// the installed record declare `capability`.
    pub fn authorize(
        &self,
        identity: &RequestIdentity,
        capability: CapabilityKind,
    ) -> Result<ExtensionIdentity, HostError> {
        let extension = self
            .extensions
            .get_installed(identity.extension_id())
            .map_err(|ExtensionLookupError::NotInstalled(id)| HostError::ExtensionNotFound(id))?;

        if !identity.has_capability(capability) || !extension.has_capability(capability) {
            warn!(
                extension_id = %extension.id,
                capability = %capability,
                "Extension lacks required capability"
            );
            return Err(HostError::Authorization {
                extension_id: extension.id,
                capability,
            });
        }

        Ok(extension)
    }

    /// Authorize the caller, then serve the provider handshake on a spawned
    /// task. The returned receiver is the outbound half of the stream.
    pub fn open_provider_stream<M, P, S>(
        &self,
        identity: &RequestIdentity,
        registry: ProviderRegistry<P>,
        factory: ProviderFactory<P, M>,
        inbound: S,
    ) -> Result<mpsc::Receiver<Result<M, Status>>, HostError>
    where
        M: ProviderEnvelope,
        P: ?Sized + Send + Sync + 'static,
        S: Stream<Item = Result<M, Status>> + Unpin + Send + 'static,
    {
        let kind = M::KIND;
        let extension = self.authorize(identity, kind.required_capability()).inspect_err(|_| {
            record_registration(kind, "permission_denied");
        })?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let handshake = Handshake {
            extension_id: extension.id,
            registry,
            factory,
            outbound: tx,
            response_buffer: self.response_buffer,
            cancel: self.shutdown.child_token(),
        };
        tokio::spawn(handshake.run(inbound));

        Ok(rx)
    }
}

struct Handshake<P: ?Sized, M: ProviderEnvelope> {
    extension_id: String,
    registry: ProviderRegistry<P>,
    factory: ProviderFactory<P, M>,
    outbound: mpsc::Sender<Result<M, Status>>,
    response_buffer: usize,
    cancel: CancellationToken,
}

impl<P, M> Handshake<P, M>
where
    M: ProviderEnvelope,
    P: ?Sized + Send + Sync + 'static,
{
    async fn run<S>(self, mut inbound: S)
    where
        S: Stream<Item = Result<M, Status>> + Unpin + Send + 'static,
    {
        let kind = M::KIND;

        let first = tokio::select! {
            _ = self.cancel.cancelled() => return,
            first = inbound.next() => first,
        };
        let first = match first {
            Some(Ok(msg)) => msg,
            Some(Err(status)) => {
                warn!(extension_id = %self.extension_id, kind = %kind, error = %status, "Stream failed before registration");
                return;
            }
            None => return,
        };

        let Some(key) = first.registration_key().filter(|k| !k.is_empty()) else {
            record_registration(kind, "protocol_violation");
            self.reject(HostError::ProtocolViolation(format!(
                "expected {kind} registration request, got '{}'",
                first.kind()
            )))
            .await;
            return;
        };

        let broker = Arc::new(MessageBroker::with_response_buffer(
            format!("{kind}:{key}"),
            self.outbound.clone(),
            self.response_buffer,
        ));

        // Later registration requests on this stream get an error response.
        if let Err(e) = broker.on(REGISTER_REQUEST, |_ctx, _msg: M| async {
            anyhow::bail!("provider already registered on this stream")
        }) {
            record_registration(kind, "internal_error");
            warn!(extension_id = %self.extension_id, kind = %kind, error = %e, "Failed to install duplicate-registration guard");
            self.reject(HostError::InternalRegistrationFailure(e.to_string())).await;
            return;
        }

        let factory = self.factory.clone();
        let guard = match self
            .registry
            .try_register(&key, || factory(&key, broker.clone()))
        {
            Ok(guard) => guard,
            Err(RegistryError::AlreadyRegistered { kind, key }) => {
                record_registration(kind, "conflict");
                warn!(extension_id = %self.extension_id, kind = %kind, provider_key = %key, "Provider key already registered");
                self.reject(HostError::RegistrationConflict { kind, key }).await;
                return;
            }
            Err(RegistryError::Construction(e)) => {
                record_registration(kind, "internal_error");
                self.reject(HostError::InternalRegistrationFailure(e.to_string())).await;
                return;
            }
        };

        if broker
            .send(M::registration_ack(first.request_id()))
            .await
            .is_err()
        {
            return;
        }

        record_registration(kind, "accepted");
        info!(
            extension_id = %self.extension_id,
            kind = %kind,
            provider_key = %key,
            "Provider registration accepted"
        );

        match broker.run(inbound, self.cancel.clone()).await {
            Ok(()) | Err(BrokerError::Cancelled) => {
                info!(extension_id = %self.extension_id, kind = %kind, provider_key = %key, "Provider stream closed");
            }
            Err(e) => {
                warn!(extension_id = %self.extension_id, kind = %kind, provider_key = %key, error = %e, "Provider stream failed");
            }
        }

        drop(guard);
    }

    async fn reject(&self, err: HostError) {
        let _ = self.outbound.send(Err(err.into())).await;
    }
}

fn record_registration(kind: ProviderKind, outcome: &'static str) {
    metrics::counter!("exthost_registrations_total", "kind" => kind.as_str(), "outcome" => outcome)
        .increment(1);
}
