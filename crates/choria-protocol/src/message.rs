//! # Version Independent Envelopes
//!
//! Closed unions over the version 1 and version 2 envelopes. Operations that
//! combine two envelopes refuse to mix versions with
//! [`ProtocolError::IncompatibleVersion`].

use chrono::{DateTime, Utc};
use choria_security::SecurityProvider;

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::federation::{Federable, NetworkHop};
use crate::filter::Filter;
use crate::version::{version_from_json, ProtocolVersion};
use crate::{v1, v2};

macro_rules! dispatch {
    ($value:expr, $m:ident => $body:expr) => {
        match $value {
            Self::V1($m) => $body,
            Self::V2($m) => $body,
        }
    };
}

macro_rules! federable_union {
    ($ty:ident) => {
        impl Federable for $ty {
            fn federation_request_id(&self) -> Option<&str> {
                dispatch!(self, m => m.federation_request_id())
            }

            fn federation_reply_to(&self) -> Option<&str> {
                dispatch!(self, m => m.federation_reply_to())
            }

            fn federation_targets(&self) -> Option<&[String]> {
                dispatch!(self, m => m.federation_targets())
            }

            fn set_federation_request_id(&mut self, id: &str) {
                dispatch!(self, m => m.set_federation_request_id(id))
            }

            fn set_federation_reply_to(&mut self, reply: &str) {
                dispatch!(self, m => m.set_federation_reply_to(reply))
            }

            fn set_federation_targets(&mut self, targets: Vec<String>) {
                dispatch!(self, m => m.set_federation_targets(targets))
            }

            fn set_unfederated(&mut self) {
                dispatch!(self, m => m.set_unfederated())
            }

            fn is_federated(&self) -> bool {
                dispatch!(self, m => m.is_federated())
            }

            fn record_network_hop(&mut self, inbound: &str, processor: &str, outbound: &str) {
                dispatch!(self, m => m.record_network_hop(inbound, processor, outbound))
            }

            fn network_hops(&self) -> &[NetworkHop] {
                dispatch!(self, m => m.network_hops())
            }
        }
    };
}

fn incompatible(target: ProtocolVersion, found: ProtocolVersion) -> ProtocolError {
    ProtocolError::IncompatibleVersion { target, found }
}

/// An RPC request of either version.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Version 1
    V1(v1::Request),
    /// Version 2
    V2(v2::Request),
}

federable_union!(Request);

impl Request {
    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        dispatch!(self, r => r.version())
    }

    /// Replace the message body.
    pub fn set_message(&mut self, message: &[u8]) {
        dispatch!(self, r => r.set_message(message))
    }

    /// Message body.
    pub fn message(&self) -> &[u8] {
        dispatch!(self, r => r.message())
    }

    /// Set the caller id.
    pub fn set_caller_id(&mut self, caller: &str) {
        dispatch!(self, r => r.set_caller_id(caller))
    }

    /// Set the collective.
    pub fn set_collective(&mut self, collective: &str) {
        dispatch!(self, r => r.set_collective(collective))
    }

    /// Set the target agent.
    pub fn set_agent(&mut self, agent: &str) {
        dispatch!(self, r => r.set_agent(agent))
    }

    /// Set the request id.
    pub fn set_request_id(&mut self, id: &str) {
        dispatch!(self, r => r.set_request_id(id))
    }

    /// Set the time to live in seconds.
    pub fn set_ttl(&mut self, ttl: i64) {
        dispatch!(self, r => r.set_ttl(ttl))
    }

    /// Replace the filter with an empty one and return it.
    pub fn new_filter(&mut self) -> &mut Filter {
        dispatch!(self, r => r.new_filter())
    }

    /// Replace the filter.
    pub fn set_filter(&mut self, filter: Filter) {
        dispatch!(self, r => r.set_filter(filter))
    }

    /// The filter and whether it restricts anything.
    pub fn filter(&mut self) -> (&mut Filter, bool) {
        dispatch!(self, r => r.filter())
    }

    /// Request id.
    pub fn request_id(&self) -> &str {
        dispatch!(self, r => r.request_id())
    }

    /// Identity of the sending process.
    pub fn sender_id(&self) -> &str {
        dispatch!(self, r => r.sender_id())
    }

    /// Caller id.
    pub fn caller_id(&self) -> &str {
        dispatch!(self, r => r.caller_id())
    }

    /// Target collective.
    pub fn collective(&self) -> &str {
        dispatch!(self, r => r.collective())
    }

    /// Target agent.
    pub fn agent(&self) -> &str {
        dispatch!(self, r => r.agent())
    }

    /// Time to live in seconds.
    pub fn ttl(&self) -> i64 {
        dispatch!(self, r => r.ttl())
    }

    /// Creation time.
    pub fn time(&self) -> DateTime<Utc> {
        dispatch!(self, r => r.time())
    }

    /// Schema validated JSON.
    pub fn json(&self) -> Result<Vec<u8>, ProtocolError> {
        dispatch!(self, r => r.json())
    }
}

/// An RPC reply of either version.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Version 1
    V1(v1::Reply),
    /// Version 2
    V2(v2::Reply),
}

federable_union!(Reply);

impl Reply {
    /// A reply to `request` of the same version.
    pub fn new(request: &Request, certname: &str) -> Result<Self, ProtocolError> {
        match request {
            Request::V1(r) => v1::Reply::new(r, certname).map(Self::V1),
            Request::V2(r) => v2::Reply::new(r, certname).map(Self::V2),
        }
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        dispatch!(self, r => r.version())
    }

    /// Replace the message body.
    pub fn set_message(&mut self, message: &[u8]) {
        dispatch!(self, r => r.set_message(message))
    }

    /// Message body.
    pub fn message(&self) -> &[u8] {
        dispatch!(self, r => r.message())
    }

    /// Id of the request this answers.
    pub fn request_id(&self) -> &str {
        dispatch!(self, r => r.request_id())
    }

    /// Identity of the replying node.
    pub fn sender_id(&self) -> &str {
        dispatch!(self, r => r.sender_id())
    }

    /// Agent that produced the reply.
    pub fn agent(&self) -> &str {
        dispatch!(self, r => r.agent())
    }

    /// Creation time.
    pub fn time(&self) -> DateTime<Utc> {
        dispatch!(self, r => r.time())
    }

    /// JSON, schema validated when strict validation is on.
    pub fn json(&self, config: &ProtocolConfig) -> Result<Vec<u8>, ProtocolError> {
        dispatch!(self, r => r.json(config))
    }
}

/// A signed request of either version.
#[derive(Debug, Clone, PartialEq)]
pub enum SecureRequest {
    /// Version 1
    V1(v1::SecureRequest),
    /// Version 2
    V2(v2::SecureRequest),
}

impl SecureRequest {
    /// Sign `request` locally.
    pub fn new(request: &Request, security: &dyn SecurityProvider, config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        match request {
            Request::V1(r) => v1::SecureRequest::new(r, security, config).map(Self::V1),
            Request::V2(r) => v2::SecureRequest::new(r, security, config).map(Self::V2),
        }
    }

    /// Have the remote signer sign `request`.
    pub async fn new_remote_signed(
        request: &Request,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<Self, ProtocolError> {
        match request {
            Request::V1(r) => v1::SecureRequest::new_remote_signed(r, security, config).await.map(Self::V1),
            Request::V2(r) => v2::SecureRequest::new_remote_signed(r, security, config).await.map(Self::V2),
        }
    }

    /// Parse the secure request carried by `transport`.
    pub fn from_transport(
        transport: &TransportMessage,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
        skip_validation: bool,
    ) -> Result<Self, ProtocolError> {
        match transport {
            TransportMessage::V1(t) => v1::SecureRequest::from_transport(t, security, config, skip_validation).map(Self::V1),
            TransportMessage::V2(t) => v2::SecureRequest::from_transport(t, security, config, skip_validation).map(Self::V2),
        }
    }

    /// Recover the signed request.
    pub fn request(&self) -> Result<Request, ProtocolError> {
        match self {
            Self::V1(s) => v1::Request::from_secure_request(s).map(Request::V1),
            Self::V2(s) => v2::Request::from_secure_request(s).map(Request::V2),
        }
    }

    /// Whether signature and caller check out.
    pub fn valid(&self, security: &dyn SecurityProvider, config: &ProtocolConfig) -> bool {
        dispatch!(self, s => s.valid(security, config))
    }

    /// Signed message body.
    pub fn message(&self) -> &[u8] {
        dispatch!(self, s => s.message())
    }

    /// Token of the caller, version 1 requests carry a certificate instead.
    pub fn caller_jwt(&self) -> Option<&str> {
        match self {
            Self::V1(_) => None,
            Self::V2(s) => Some(s.caller_jwt()),
        }
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        dispatch!(self, s => s.version())
    }

    /// Schema validated JSON.
    pub fn json(&self) -> Result<Vec<u8>, ProtocolError> {
        dispatch!(self, s => s.json())
    }
}

/// A protected reply of either version.
#[derive(Debug, Clone, PartialEq)]
pub enum SecureReply {
    /// Version 1
    V1(v1::SecureReply),
    /// Version 2
    V2(v2::SecureReply),
}

impl SecureReply {
    /// Wrap `reply`.
    pub fn new(reply: &Reply, security: &dyn SecurityProvider, config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        match reply {
            Reply::V1(r) => v1::SecureReply::new(r, security, config).map(Self::V1),
            Reply::V2(r) => v2::SecureReply::new(r, security, config).map(Self::V2),
        }
    }

    /// Parse the secure reply carried by `transport`.
    pub fn from_transport(
        transport: &TransportMessage,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
        skip_validation: bool,
    ) -> Result<Self, ProtocolError> {
        match transport {
            TransportMessage::V1(t) => v1::SecureReply::from_transport(t, security, skip_validation).map(Self::V1),
            TransportMessage::V2(t) => v2::SecureReply::from_transport(t, security, config, skip_validation).map(Self::V2),
        }
    }

    /// Recover the wrapped reply.
    pub fn reply(&self, config: &ProtocolConfig) -> Result<Reply, ProtocolError> {
        match self {
            Self::V1(s) => v1::Reply::from_secure_reply(s, config).map(Reply::V1),
            Self::V2(s) => v2::Reply::from_secure_reply(s, config).map(Reply::V2),
        }
    }

    /// Whether the hash, and for version 2 the signature, check out.
    pub fn valid(&self, security: &dyn SecurityProvider, config: &ProtocolConfig) -> bool {
        match self {
            Self::V1(s) => s.valid(security),
            Self::V2(s) => s.valid(security, config),
        }
    }

    /// Reply body.
    pub fn message(&self) -> &[u8] {
        dispatch!(self, s => s.message())
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        dispatch!(self, s => s.version())
    }

    /// Schema validated JSON.
    pub fn json(&self) -> Result<Vec<u8>, ProtocolError> {
        dispatch!(self, s => s.json())
    }
}

/// A wire frame of either version.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    /// Version 1
    V1(v1::TransportMessage),
    /// Version 2
    V2(v2::TransportMessage),
}

federable_union!(TransportMessage);

impl TransportMessage {
    /// Parse a transport of whichever version `data` names.
    pub fn from_json(config: &ProtocolConfig, data: &[u8]) -> Result<Self, ProtocolError> {
        match version_from_json(data) {
            ProtocolVersion::TransportV1 => v1::TransportMessage::from_json(config, data).map(Self::V1),
            ProtocolVersion::TransportV2 => v2::TransportMessage::from_json(config, data).map(Self::V2),
            other => Err(ProtocolError::UnknownProtocol(other)),
        }
    }

    /// Carry `request`, which must be of the same version.
    pub fn set_request_data(&mut self, request: &SecureRequest) -> Result<(), ProtocolError> {
        match (self, request) {
            (Self::V1(t), SecureRequest::V1(r)) => t.set_request_data(r),
            (Self::V2(t), SecureRequest::V2(r)) => t.set_request_data(r),
            (t, r) => Err(incompatible(t.version(), r.version())),
        }
    }

    /// Carry `reply`, which must be of the same version.
    pub fn set_reply_data(&mut self, reply: &SecureReply) -> Result<(), ProtocolError> {
        match (self, reply) {
            (Self::V1(t), SecureReply::V1(r)) => t.set_reply_data(r),
            (Self::V2(t), SecureReply::V2(r)) => t.set_reply_data(r),
            (t, r) => Err(incompatible(t.version(), r.version())),
        }
    }

    /// The carried document.
    pub fn message(&self) -> &[u8] {
        dispatch!(self, t => t.message())
    }

    /// Set the publisher identity.
    pub fn set_sender(&mut self, sender: &str) {
        dispatch!(self, t => t.set_sender(sender))
    }

    /// Set the reply subject.
    pub fn set_reply_to(&mut self, reply: &str) {
        dispatch!(self, t => t.set_reply_to(reply))
    }

    /// Publisher identity.
    pub fn sender_id(&self) -> &str {
        dispatch!(self, t => t.sender_id())
    }

    /// Reply subject.
    pub fn reply_to(&self) -> &str {
        dispatch!(self, t => t.reply_to())
    }

    /// Hop trail.
    pub fn seen_by(&self) -> &[NetworkHop] {
        self.network_hops()
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        dispatch!(self, t => t.version())
    }

    /// JSON, schema validated when strict validation is on.
    pub fn json(&self, config: &ProtocolConfig) -> Result<Vec<u8>, ProtocolError> {
        dispatch!(self, t => t.json(config))
    }
}
