use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::federation::{impl_federable, NetworkHop};
use crate::filter::Filter;
use crate::schema;
use crate::version::ProtocolVersion;

use super::transport::FederationTransportHeader;
use super::SecureRequest;

/// Version 1 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    protocol: ProtocolVersion,
    message: String,
    envelope: RequestEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RequestEnvelope {
    requestid: String,
    senderid: String,
    callerid: String,
    collective: String,
    agent: String,
    ttl: i64,
    time: i64,
    filter: Option<Filter>,

    #[serde(skip)]
    seen_by: Vec<NetworkHop>,
    #[serde(skip)]
    federation: Option<FederationTransportHeader>,
}

impl_federable!(Request, FederationTransportHeader, federation: envelope.federation, hops: envelope.seen_by);

impl Request {
    /// A request created now with an empty filter.
    pub fn new(agent: &str, sender: &str, caller: &str, ttl: i64, id: &str, collective: &str) -> Self {
        Self {
            protocol: ProtocolVersion::RequestV1,
            message: String::new(),
            envelope: RequestEnvelope {
                requestid: id.to_string(),
                senderid: sender.to_string(),
                callerid: caller.to_string(),
                collective: collective.to_string(),
                agent: agent.to_string(),
                ttl,
                time: Utc::now().timestamp(),
                filter: Some(Filter::new()),
                ..Default::default()
            },
        }
    }

    /// Recover the request signed into a secure request.
    pub fn from_secure_request(secure: &SecureRequest) -> Result<Self, ProtocolError> {
        if secure.version() != ProtocolVersion::SecureRequestV1 {
            return Err(ProtocolError::IncompatibleVersion {
                target: ProtocolVersion::RequestV1,
                found: secure.version(),
            });
        }

        Self::is_valid_json(secure.message())?;

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

    /// Set the caller id.
    pub fn set_caller_id(&mut self, caller: &str) {
        self.envelope.callerid = caller.to_string();
    }

    /// Set the collective.
    pub fn set_collective(&mut self, collective: &str) {
        self.envelope.collective = collective.to_string();
    }

    /// Set the target agent.
    pub fn set_agent(&mut self, agent: &str) {
        self.envelope.agent = agent.to_string();
    }

    /// Set the request id.
    pub fn set_request_id(&mut self, id: &str) {
        self.envelope.requestid = id.to_string();
    }

    /// Set the time to live in seconds.
    pub fn set_ttl(&mut self, ttl: i64) {
        self.envelope.ttl = ttl;
    }

    /// Replace the filter with an empty one and return it.
    pub fn new_filter(&mut self) -> &mut Filter {
        self.envelope.filter.insert(Filter::new())
    }

    /// Replace the filter.
    pub fn set_filter(&mut self, filter: Filter) {
        self.envelope.filter = Some(filter);
    }

    /// The filter and whether it restricts anything. An absent filter is
    /// initialised empty.
    pub fn filter(&mut self) -> (&mut Filter, bool) {
        let filter = self.envelope.filter.get_or_insert_with(Filter::new);
        let filtered = !filter.is_empty();
        (filter, filtered)
    }

    /// Request id.
    pub fn request_id(&self) -> &str {
        &self.envelope.requestid
    }

    /// Identity of the sending process.
    pub fn sender_id(&self) -> &str {
        &self.envelope.senderid
    }

    /// Caller id.
    pub fn caller_id(&self) -> &str {
        &self.envelope.callerid
    }

    /// Target collective.
    pub fn collective(&self) -> &str {
        &self.envelope.collective
    }

    /// Target agent.
    pub fn agent(&self) -> &str {
        &self.envelope.agent
    }

    /// Time to live in seconds.
    pub fn ttl(&self) -> i64 {
        self.envelope.ttl
    }

    /// Creation time, second precision.
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.envelope.time, 0).single().unwrap_or_default()
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Schema validated JSON.
    pub fn json(&self) -> Result<Vec<u8>, ProtocolError> {
        let j = serde_json::to_vec(self)?;
        Self::is_valid_json(&j)?;
        Ok(j)
    }

    /// Validate a document against the version 1 request schema.
    pub fn is_valid_json(data: &[u8]) -> Result<(), ProtocolError> {
        schema::validate(ProtocolVersion::RequestV1, data)
    }
}
