//! # Envelope Service
//!
//! Builds envelopes of the version matching the active security provider:
//! X.509 providers get version 1, Ed25519 + JWT providers get version 2.
//! Constructed once at process start and shared by reference.

use std::sync::Arc;

use choria_security::{SecurityProvider, SecurityTechnology};
use tracing::instrument;

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::message::{Reply, Request, SecureReply, SecureRequest, TransportMessage};
use crate::{v1, v2};

/// Version aware envelope factory.
#[derive(Clone)]
pub struct EnvelopeService {
    config: ProtocolConfig,
    security: Arc<dyn SecurityProvider>,
}

impl std::fmt::Debug for EnvelopeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeService")
            .field("config", &self.config)
            .field("provider", &self.security.provider())
            .finish()
    }
}

impl EnvelopeService {
    /// Service using `security` for all signing and verification.
    pub fn new(config: ProtocolConfig, security: Arc<dyn SecurityProvider>) -> Self {
        Self { config, security }
    }

    /// Protocol settings.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Active security provider.
    pub fn security(&self) -> &dyn SecurityProvider {
        self.security.as_ref()
    }

    fn is_v2(&self) -> bool {
        self.security.backing_technology() == SecurityTechnology::Ed25519Jwt
    }

    /// A new request.
    pub fn new_request(
        &self,
        agent: &str,
        sender: &str,
        caller: &str,
        ttl: i64,
        id: &str,
        collective: &str,
    ) -> Request {
        if self.is_v2() {
            Request::V2(v2::Request::new(agent, sender, caller, ttl, id, collective))
        } else {
            Request::V1(v1::Request::new(agent, sender, caller, ttl, id, collective))
        }
    }

    /// A reply to `request` from this node.
    pub fn new_reply(&self, request: &Request) -> Result<Reply, ProtocolError> {
        Reply::new(request, self.security.identity())
    }

    /// The reply inside `secure`.
    pub fn new_reply_from_secure_reply(&self, secure: &SecureReply) -> Result<Reply, ProtocolError> {
        secure.reply(&self.config)
    }

    /// The request inside `secure`.
    pub fn new_request_from_secure_request(&self, secure: &SecureRequest) -> Result<Request, ProtocolError> {
        secure.request()
    }

    /// Sign `request` locally.
    pub fn new_secure_request(&self, request: &Request) -> Result<SecureRequest, ProtocolError> {
        SecureRequest::new(request, self.security(), &self.config)
    }

    /// Have the remote signer sign `request`.
    #[instrument(skip(self, request), fields(agent = %request.agent(), id = %request.request_id()))]
    pub async fn new_remote_signed_secure_request(&self, request: &Request) -> Result<SecureRequest, ProtocolError> {
        SecureRequest::new_remote_signed(request, self.security(), &self.config).await
    }

    /// Parse and, unless skipped, validate the secure request in `transport`.
    pub fn new_secure_request_from_transport(
        &self,
        transport: &TransportMessage,
        skip_validation: bool,
    ) -> Result<SecureRequest, ProtocolError> {
        SecureRequest::from_transport(transport, self.security(), &self.config, skip_validation)
    }

    /// Wrap `reply`.
    pub fn new_secure_reply(&self, reply: &Reply) -> Result<SecureReply, ProtocolError> {
        SecureReply::new(reply, self.security(), &self.config)
    }

    /// Parse and, unless skipped, validate the secure reply in `transport`.
    pub fn new_secure_reply_from_transport(
        &self,
        transport: &TransportMessage,
        skip_validation: bool,
    ) -> Result<SecureReply, ProtocolError> {
        SecureReply::from_transport(transport, self.security(), &self.config, skip_validation)
    }

    /// An empty transport published by `sender`.
    pub fn new_transport_message(&self, sender: &str) -> TransportMessage {
        if self.is_v2() {
            TransportMessage::V2(v2::TransportMessage::new(sender))
        } else {
            TransportMessage::V1(v1::TransportMessage::new(sender))
        }
    }

    /// Parse a transport of whichever version `data` names.
    pub fn new_transport_from_json(&self, data: &[u8]) -> Result<TransportMessage, ProtocolError> {
        TransportMessage::from_json(&self.config, data)
    }

    /// Whether `secure` passes signature and caller checks.
    pub fn valid_secure_request(&self, secure: &SecureRequest) -> bool {
        secure.valid(self.security(), &self.config)
    }

    /// Whether `secure` passes its integrity checks.
    pub fn valid_secure_reply(&self, secure: &SecureReply) -> bool {
        secure.valid(self.security(), &self.config)
    }
}
