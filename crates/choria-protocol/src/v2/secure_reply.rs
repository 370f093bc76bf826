use choria_security::SecurityProvider;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use tracing::error;

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::schema;
use crate::version::ProtocolVersion;

use super::{require_ed25519, Reply, TransportMessage};

/// Version 2 reply wrapper.
///
/// `hash` is the hex SHA-256 of the body. With security on the replying
/// server also signs the body and attaches its JWT as `sender`, so a relay
/// cannot substitute a body with a matching hash.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureReply {
    protocol: ProtocolVersion,
    #[serde_as(as = "Base64")]
    reply: Vec<u8>,
    hash: String,
    #[serde_as(as = "Base64")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    sender: String,
}

impl SecureReply {
    /// Wrap, hash and when secure sign `reply`.
    pub fn new(reply: &Reply, security: &dyn SecurityProvider, config: &ProtocolConfig) -> Result<Self, ProtocolError> {
        require_ed25519(security)?;

        let mut secure = Self {
            protocol: ProtocolVersion::SecureReplyV2,
            reply: Vec::new(),
            hash: String::new(),
            signature: Vec::new(),
            sender: String::new(),
        };

        secure.set_message(reply, security, config)?;

        Ok(secure)
    }

    /// Parse the secure reply carried in `transport`, validating it unless
    /// `skip_validation` is set.
    pub fn from_transport(
        transport: &TransportMessage,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
        skip_validation: bool,
    ) -> Result<Self, ProtocolError> {
        require_ed25519(security)?;

        let secure = Self::from_json(transport.message())?;

        if !skip_validation && !secure.valid(security, config) {
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

    /// Store `reply` as the message, hash it and when secure sign it.
    pub fn set_message(
        &mut self,
        reply: &Reply,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<(), ProtocolError> {
        let j = reply
            .json(config)
            .map_err(|e| ProtocolError::encode("reply message to store it in the Secure Reply", e))?;

        self.hash = hex::encode(security.checksum_bytes(&j));

        if config.secure {
            self.signature = security.sign_bytes(&j)?;
            self.sender = String::from_utf8_lossy(&security.token_bytes()?).into_owned();
        } else {
            self.signature.clear();
            self.sender.clear();
        }

        self.reply = j;

        Ok(())
    }

    /// Whether the hash matches the body and, when secure, the signature
    /// verifies against the sender JWT.
    pub fn valid(&self, security: &dyn SecurityProvider, config: &ProtocolConfig) -> bool {
        let hash = hex::encode(security.checksum_bytes(&self.reply));
        if hash != self.hash {
            error!(expected = %self.hash, actual = %hash, "Received a reply with an invalid hash");
            return false;
        }

        if !config.secure {
            return true;
        }

        if self.signature.is_empty() || self.sender.is_empty() {
            error!("Received an unsigned reply");
            return false;
        }

        let (ok, _) = security.verify_signature_bytes(&self.reply, &self.signature, &[self.sender.as_bytes()]);
        if !ok {
            error!("Reply signature did not verify against the sender token");
            return false;
        }

        true
    }

    /// Reply body.
    pub fn message(&self) -> &[u8] {
        &self.reply
    }

    /// JWT of the replying server, empty when unsigned.
    pub fn sender_jwt(&self) -> &str {
        &self.sender
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

    /// Validate a document against the version 2 secure reply schema.
    pub fn is_valid_json(data: &[u8]) -> Result<(), ProtocolError> {
        schema::validate(ProtocolVersion::SecureReplyV2, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSecurity;
    use crate::v2::Request;
    use choria_security::SecurityTechnology;

    fn reply() -> Reply {
        let req = Request::new("ginkgo", "ginkgo.example.net", "up=ginkgo", 60, "a2f0ca717c694f2086cfa81b6c494648", "choria");
        let mut reply = Reply::new(&req, "server.example.net").unwrap();
        reply.set_message(b"{\"ok\":true}");
        reply
    }

    fn server() -> FakeSecurity {
        FakeSecurity::new(SecurityTechnology::Ed25519Jwt, "server jwt")
    }

    #[test]
    fn test_signed_reply() {
        let config = ProtocolConfig::default();
        let secure = SecureReply::new(&reply(), &server(), &config).unwrap();

        assert_eq!(secure.sender_jwt(), "server jwt");
        assert_eq!(secure.hash.len(), 64);
        assert!(secure.valid(&server(), &config));

        let inner = Reply::from_secure_reply(&secure, &config).unwrap();
        assert_eq!(inner.message(), b"{\"ok\":true}");
    }

    #[test]
    fn test_forged_body_with_matching_hash() {
        let config = ProtocolConfig::default();
        let mut secure = SecureReply::new(&reply(), &server(), &config).unwrap();

        let mut forged = reply();
        forged.set_message(b"{\"ok\":false}");
        secure.reply = forged.json(&config).unwrap();
        secure.hash = hex::encode(server().checksum_bytes(&secure.reply));

        assert!(!secure.valid(&server(), &config));
    }

    #[test]
    fn test_tampered_hash() {
        let config = ProtocolConfig::default();
        let mut secure = SecureReply::new(&reply(), &server(), &config).unwrap();
        secure.hash = "00".repeat(32);

        assert!(!secure.valid(&server(), &config));
    }

    #[test]
    fn test_insecure_reply() {
        let config = ProtocolConfig::insecure();
        let secure = SecureReply::new(&reply(), &server(), &config).unwrap();

        let j: serde_json::Value = serde_json::from_slice(&secure.json().unwrap()).unwrap();
        assert!(j.get("signature").is_none());
        assert!(j.get("sender").is_none());
        assert!(secure.valid(&server(), &config));

        // an unsigned reply is refused once security is on
        assert!(!secure.valid(&server(), &ProtocolConfig::default()));
    }

    #[test]
    fn test_from_transport() {
        let config = ProtocolConfig::default();
        let secure = SecureReply::new(&reply(), &server(), &config).unwrap();

        let mut transport = TransportMessage::new("server.example.net");
        transport.set_reply_data(&secure).unwrap();

        assert_eq!(SecureReply::from_transport(&transport, &server(), &config, false).unwrap(), secure);
    }
}
