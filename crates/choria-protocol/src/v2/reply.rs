use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::federation::{copy_federation_data, impl_federable, NetworkHop};
use crate::schema;
use crate::version::ProtocolVersion;

use super::transport::FederationTransportHeader;
use super::{Request, SecureReply};

/// Version 2 reply.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    protocol: ProtocolVersion,
    #[serde_as(as = "Base64")]
    message: Vec<u8>,
    request: String,
    sender: String,
    agent: String,
    time: i64,

    #[serde(skip)]
    seen_by: Vec<NetworkHop>,
    #[serde(skip)]
    federation: Option<FederationTransportHeader>,
}

impl_federable!(Reply, FederationTransportHeader, federation: federation, hops: seen_by);

impl Reply {
    /// A reply to `request` sent by `certname`, carrying its federation data.
    /// The message starts out as the request JSON.
    pub fn new(request: &Request, certname: &str) -> Result<Self, ProtocolError> {
        let mut reply = Self {
            protocol: ProtocolVersion::ReplyV2,
            message: Vec::new(),
            request: request.request_id().to_string(),
            sender: certname.to_string(),
            agent: request.agent().to_string(),
            time: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            seen_by: Vec::new(),
            federation: None,
        };

        copy_federation_data(request, &mut reply);
        reply.set_message(&request.json()?);

        Ok(reply)
    }

    /// Recover the reply wrapped in a secure reply.
    pub fn from_secure_reply(secure: &SecureReply, config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        if secure.version() != ProtocolVersion::SecureReplyV2 {
            return Err(ProtocolError::IncompatibleVersion {
                target: ProtocolVersion::ReplyV2,
                found: secure.version(),
            });
        }

        Self::is_valid_json(config, secure.message())?;

        Ok(serde_json::from_slice(secure.message())?)
    }

    /// Replace the message body.
    pub fn set_message(&mut self, message: &[u8]) {
        self.message = message.to_vec();
    }

    /// Message body.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Id of the request this answers.
    pub fn request_id(&self) -> &str {
        &self.request
    }

    /// Identity of the replying node.
    pub fn sender_id(&self) -> &str {
        &self.sender
    }

    /// Agent that produced the reply.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Creation time.
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.time)
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

        schema::validate(ProtocolVersion::ReplyV2, data)
    }
}
