use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::federation::{impl_federable, NetworkHop};
use crate::schema;
use crate::version::ProtocolVersion;

use super::{SecureReply, SecureRequest};

/// Federation routing data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationTransportHeader {
    /// Federation request id
    #[serde(rename = "request", default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    /// Subject federation replies go to
    #[serde(rename = "reply", default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,
    /// Subjects the federation broker publishes to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

/// Routing headers of a version 2 transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportHeaders {
    /// Reply subject
    #[serde(rename = "reply", default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,
    /// Identity of the publisher
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
    /// Hop trail
    #[serde(rename = "trace", default, skip_serializing_if = "Vec::is_empty")]
    pub seen_by: Vec<NetworkHop>,
    /// Federation data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<FederationTransportHeader>,
}

/// Version 2 wire frame.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    protocol: ProtocolVersion,
    #[serde_as(as = "Base64")]
    data: Vec<u8>,
    #[serde(default)]
    headers: TransportHeaders,
}

impl_federable!(TransportMessage, FederationTransportHeader, federation: headers.federation, hops: headers.seen_by);

impl TransportMessage {
    /// An empty transport published by `sender`.
    pub fn new(sender: &str) -> Self {
        Self {
            protocol: ProtocolVersion::TransportV2,
            data: Vec::new(),
            headers: TransportHeaders {
                sender: sender.to_string(),
                ..Default::default()
            },
        }
    }

    /// Parse a transport received from the network.
    pub fn from_json(config: &ProtocolConfig, data: &[u8]) -> Result<Self, ProtocolError> {
        Self::is_valid_json(config, data)?;
        Ok(serde_json::from_slice(data)?)
    }

    /// Carry `request`.
    pub fn set_request_data(&mut self, request: &SecureRequest) -> Result<(), ProtocolError> {
        self.data = request
            .json()
            .map_err(|e| ProtocolError::encode("the Request structure for transport", e))?;
        Ok(())
    }

    /// Carry `reply`.
    pub fn set_reply_data(&mut self, reply: &SecureReply) -> Result<(), ProtocolError> {
        self.data = reply
            .json()
            .map_err(|e| ProtocolError::encode("the Reply structure for transport", e))?;
        Ok(())
    }

    /// The carried document.
    pub fn message(&self) -> &[u8] {
        &self.data
    }

    /// Set the publisher identity.
    pub fn set_sender(&mut self, sender: &str) {
        self.headers.sender = sender.to_string();
    }

    /// Set the reply subject.
    pub fn set_reply_to(&mut self, reply: &str) {
        self.headers.reply_to = reply.to_string();
    }

    /// Publisher identity.
    pub fn sender_id(&self) -> &str {
        &self.headers.sender
    }

    /// Reply subject.
    pub fn reply_to(&self) -> &str {
        &self.headers.reply_to
    }

    /// Hop trail.
    pub fn seen_by(&self) -> &[NetworkHop] {
        &self.headers.seen_by
    }

    /// Routing headers.
    pub fn headers(&self) -> &TransportHeaders {
        &self.headers
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

    /// Validate a document against the transport schema when strict
    /// validation is on.
    pub fn is_valid_json(config: &ProtocolConfig, data: &[u8]) -> Result<(), ProtocolError> {
        if !config.client_strict_validation {
            return Ok(());
        }

        schema::validate(ProtocolVersion::TransportV2, data)
    }
}
