//! # Protocol Version 2
//!
//! Ed25519 secured envelopes with JWT identities. A secure request carries
//! the caller's JWT and, when signed by a delegated authority, the signer's
//! JWT. Replies are hashed and, when security is on, signed by the replying
//! server whose JWT travels with the reply.
//!
//! Message bodies are raw bytes encoded as base64 on the wire.

mod reply;
mod request;
mod secure_reply;
mod secure_request;
mod transport;

pub use reply::Reply;
pub use request::Request;
pub use secure_reply::SecureReply;
pub use secure_request::SecureRequest;
pub use transport::{FederationTransportHeader, TransportHeaders, TransportMessage};

use choria_security::{SecurityProvider, SecurityTechnology};

use crate::errors::ProtocolError;

fn require_ed25519(security: &dyn SecurityProvider) -> Result<(), ProtocolError> {
    match security.backing_technology() {
        SecurityTechnology::Ed25519Jwt => Ok(()),
        found => Err(ProtocolError::IncorrectProtocol {
            required: SecurityTechnology::Ed25519Jwt,
            found,
        }),
    }
}
