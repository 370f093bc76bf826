//! # Protocol Version 1
//!
//! X.509 secured envelopes. Requests are signed with the caller's RSA key and
//! carry the caller's PEM certificate; replies carry a SHA-256 hash only.

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

fn require_x509(security: &dyn SecurityProvider) -> Result<(), ProtocolError> {
    match security.backing_technology() {
        SecurityTechnology::X509 => Ok(()),
        found => Err(ProtocolError::IncorrectProtocol {
            required: SecurityTechnology::X509,
            found,
        }),
    }
}
