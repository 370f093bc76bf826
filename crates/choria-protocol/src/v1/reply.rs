use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::federation::{copy_federation_data, impl_federable, NetworkHop};
use crate::schema;
use crate::version::ProtocolVersion;

use super::transport::FederationTransportHeader;
use super::{Request, SecureReply};

/// Version 1 reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    protocol: ProtocolVersion,
    message: String,
    envelope: ReplyEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ReplyEnvelope {
    requestid: String,
    senderid: String,
    agent: String,
    time: i64,

    #[serde(skip)]
    seen_by: Vec<NetworkHop>,
    #[serde(skip)]
    federation: Option<FederationTransportHeader>,
}

impl_federable!(Reply, FederationTransportHeader, federation: envelope.federation, hops: envelope.seen_by);

impl Reply {
    /// A reply to `request` sent by `certname`, carrying its federation data.
    /// The message starts out as the request JSON.
    pub fn new(request: &Request, certname: &str) -> Result<Self, ProtocolError> {
        let mut reply = Self {
            protocol: ProtocolVersion::ReplyV1,
            message: String::new(),
            envelope: ReplyEnvelope {
                requestid: request.request_id().to_string(),
                senderid: certname.to_string(),
                agent: request.agent().to_string(),
                time: Utc::now().timestamp(),
                ..Default::default()
            },
        };

        copy_federation_data(request, &mut reply);
        reply.set_message(&request.json()?);

        Ok(reply)
    }

    /// Recover the reply wrapped in a secure reply.
    pub fn from_secure_reply(secure: &SecureReply, config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        if secure.version() != ProtocolVersion::SecureReplyV1 {
            return Err(ProtocolError::IncompatibleVersion {
                target: ProtocolVersion::ReplyV1,
                found: secure.version(),
            });
        }

        Self::is_valid_json(config, secure.message())?;

        Ok(serde_json::from_slice(secure.message())?)
    }

    /// Replace the message body.
    pub fn set_message(&mut self, message: &[u8]) {
        self.message = String::from_utf8_lossy(message).into_owned();
    }

    /// Message body.
    pub fn message(&self) -> &[u8] {
        self.message.as_bytes()
    }

    /// Id of the request this answers.
    pub fn request_id(&self) -> &str {
        &self.envelope.requestid
    }

    /// Identity of the replying node.
    pub fn sender_id(&self) -> &str {
        &self.envelope.senderid
    }

    /// Agent that produced the reply.
    pub fn agent(&self) -> &str {
        &self.envelope.agent
    }

    /// Creation time, second precision.
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.envelope.time, 0).single().unwrap_or_default()
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.protocol
    }

    /// JSON, schema validated when strict validation is on.
    pub fn json(&self, config: &ProtocolConfig) -> Result<Vec<u8>, ProtocolError> {
        let j = serde_json::to_vec(self)?;
        Self::is_valid_json(config, &j)?;
        Ok(j)
    }

    /// Validate a document against the reply schema when strict validation
    /// is on.
    pub fn is_valid_json(config: &ProtocolConfig, data: &[u8]) -> Result<(), ProtocolError> {
        if !config.client_strict_validation {
            return Ok(());
        }

        schema::validate(ProtocolVersion::ReplyV1, data)
    }
}
