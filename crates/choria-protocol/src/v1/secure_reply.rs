use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use choria_security::SecurityProvider;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::schema;
use crate::version::ProtocolVersion;

use super::{Reply, TransportMessage};

/// Version 1 reply wrapper, protected by a SHA-256 hash of the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureReply {
    protocol: ProtocolVersion,
    message: String,
    hash: String,
}

impl SecureReply {
    /// Wrap `reply` and hash it.
    pub fn new(reply: &Reply, security: &dyn SecurityProvider, config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        let mut secure = Self {
            protocol: ProtocolVersion::SecureReplyV1,
            message: String::new(),
            hash: String::new(),
        };

        secure.set_message(reply, security, config)?;

        Ok(secure)
    }

    /// Parse the secure reply carried in `transport`, checking its hash
    /// unless `skip_validation` is set.
    pub fn from_transport(
        transport: &TransportMessage,
        security: &dyn SecurityProvider,
        skip_validation: bool,
    ) -> Result<Self, ProtocolError> {
        let secure = Self::from_json(transport.message())?;

        if !skip_validation && !secure.valid(security) {
            return Err(ProtocolError::ValidationFailed(
                "SecureReply message created from the Transport Message is not valid",
            ));
        }

        Ok(secure)
    }

    /// Parse and schema validate a secure reply document.
    pub fn from_json(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::is_valid_json(data)?;
        Ok(serde_json::from_slice(data)?)
    }

    /// Store `reply` as the message and record its hash.
    pub fn set_message(
        &mut self,
        reply: &Reply,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<(), ProtocolError> {
        let j = reply
            .json(config)
            .map_err(|e| ProtocolError::encode("reply message to store it in the Secure Reply", e))?;

        self.hash = STANDARD.encode(security.checksum_bytes(&j));
        self.message = String::from_utf8_lossy(&j).into_owned();

        Ok(())
    }

    /// Whether the stored hash matches the body.
    pub fn valid(&self, security: &dyn SecurityProvider) -> bool {
        let hash = STANDARD.encode(security.checksum_bytes(self.message.as_bytes()));

        if hash != self.hash {
            error!(expected = %self.hash, actual = %hash, "Received a reply with an invalid hash");
            return false;
        }

        true
    }

    /// Reply body.
    pub fn message(&self) -> &[u8] {
        self.message.as_bytes()
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

    /// Validate a document against the version 1 secure reply schema.
    pub fn is_valid_json(data: &[u8]) -> Result<(), ProtocolError> {
        schema::validate(ProtocolVersion::SecureReplyV1, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSecurity;
    use crate::v1::Request;
    use choria_security::SecurityTechnology;

    fn reply() -> Reply {
        let req = Request::new("test", "go.tests", "choria=test", 120, "a2f0ca717c694f2086cfa81b6c494648", "mcollective");
        let mut reply = Reply::new(&req, "testing").unwrap();
        reply.set_message(b"hello world");
        reply
    }

    #[test]
    fn test_hash_roundtrip() {
        let security = FakeSecurity::new(SecurityTechnology::X509, "test");
        let config = ProtocolConfig::default();

        let secure = SecureReply::new(&reply(), &security, &config).unwrap();
        assert!(secure.valid(&security));

        let mut transport = TransportMessage::new("testing");
        transport.set_reply_data(&secure).unwrap();

        let received = SecureReply::from_transport(&transport, &security, false).unwrap();
        let inner = Reply::from_secure_reply(&received, &config).unwrap();
        assert_eq!(inner.message(), b"hello world");
        assert_eq!(inner.request_id(), "a2f0ca717c694f2086cfa81b6c494648");
    }

    #[test]
    fn test_tampered_reply() {
        let security = FakeSecurity::new(SecurityTechnology::X509, "test");

        let mut secure = SecureReply::new(&reply(), &security, &ProtocolConfig::default()).unwrap();
        secure.message = secure.message.replace("hello", "jello");
        assert!(!secure.valid(&security));

        let mut transport = TransportMessage::new("testing");
        transport.set_reply_data(&secure).unwrap();

        let err = SecureReply::from_transport(&transport, &security, false).unwrap_err();
        assert_eq!(err.to_string(), "SecureReply message created from the Transport Message is not valid");
        assert!(SecureReply::from_transport(&transport, &security, true).is_ok());
    }
}
