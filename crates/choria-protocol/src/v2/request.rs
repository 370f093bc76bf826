use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::errors::ProtocolError;
use crate::federation::{impl_federable, NetworkHop};
use crate::filter::Filter;
use crate::schema;
use crate::version::ProtocolVersion;

use super::transport::FederationTransportHeader;
use super::SecureRequest;

/// Version 2 request.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    protocol: ProtocolVersion,
    #[serde_as(as = "Base64")]
    message: Vec<u8>,
    id: String,
    sender: String,
    caller: String,
    collective: String,
    agent: String,
    ttl: i64,
    /// Nanoseconds since the epoch
    time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<Filter>,

    #[serde(skip)]
    seen_by: Vec<NetworkHop>,
    #[serde(skip)]
    federation: Option<FederationTransportHeader>,
}

impl_federable!(Request, FederationTransportHeader, federation: federation, hops: seen_by);

impl Request {
    /// A request created now with an empty filter.
    pub fn new(agent: &str, sender: &str, caller: &str, ttl: i64, id: &str, collective: &str) -> Self {
        Self {
            protocol: ProtocolVersion::RequestV2,
            message: Vec::new(),
            id: id.to_string(),
            sender: sender.to_string(),
            caller: caller.to_string(),
            collective: collective.to_string(),
            agent: agent.to_string(),
            ttl,
            time: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            filter: Some(Filter::new()),
            seen_by: Vec::new(),
            federation: None,
        }
    }

    /// Recover the request signed into a secure request.
    pub fn from_secure_request(secure: &SecureRequest) -> Result<Self, ProtocolError> {
        if secure.version() != ProtocolVersion::SecureRequestV2 {
            return Err(ProtocolError::IncompatibleVersion {
                target: ProtocolVersion::RequestV2,
                found: secure.version(),
            });
        }

        Self::is_valid_json(secure.message())?;

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

    /// Set the caller id.
    pub fn set_caller_id(&mut self, caller: &str) {
        self.caller = caller.to_string();
    }

    /// Set the collective.
    pub fn set_collective(&mut self, collective: &str) {
        self.collective = collective.to_string();
    }

    /// Set the target agent.
    pub fn set_agent(&mut self, agent: &str) {
        self.agent = agent.to_string();
    }

    /// Set the request id.
    pub fn set_request_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    /// Set the time to live in seconds.
    pub fn set_ttl(&mut self, ttl: i64) {
        self.ttl = ttl;
    }

    /// Replace the filter with an empty one and return it.
    pub fn new_filter(&mut self) -> &mut Filter {
        self.filter.insert(Filter::new())
    }

    /// Replace the filter.
    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = Some(filter);
    }

    /// The filter and whether it restricts anything. An absent filter is
    /// initialised empty.
    pub fn filter(&mut self) -> (&mut Filter, bool) {
        let filter = self.filter.get_or_insert_with(Filter::new);
        let filtered = !filter.is_empty();
        (filter, filtered)
    }

    /// Request id.
    pub fn request_id(&self) -> &str {
        &self.id
    }

    /// Identity of the sending process.
    pub fn sender_id(&self) -> &str {
        &self.sender
    }

    /// Caller id.
    pub fn caller_id(&self) -> &str {
        &self.caller
    }

    /// Target collective.
    pub fn collective(&self) -> &str {
        &self.collective
    }

    /// Target agent.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Time to live in seconds.
    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    /// Creation time.
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.time)
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

    /// Validate a document against the version 2 request schema.
    pub fn is_valid_json(data: &[u8]) -> Result<(), ProtocolError> {
        schema::validate(ProtocolVersion::RequestV2, data)
    }
}
