//! # Choria Protocol - Secure Message Envelopes
//!
//! Every RPC call travels as three nested envelopes:
//!
//! ```text
//! TransportMessage ── data ──▶ SecureRequest ── request ──▶ Request
//!   (sender, reply-to,           (signature,                  (agent, caller,
//!    federation, hops)            caller identity)             filter, message)
//! ```
//!
//! | Version | Security | Identity | Module |
//! |---------|----------|----------|--------|
//! | 1 | X.509 / RSA | PEM certificate | [`v1`] |
//! | 2 | Ed25519 + JWT | caller JWT, optional signer JWT | [`v2`] |
//!
//! The versions are deliberately incompatible. The closed unions in
//! [`message`] dispatch on the version and refuse to mix them, and
//! [`EnvelopeService`] picks the version from the active security provider.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod errors;
pub mod federation;
pub mod filter;
pub mod message;
mod schema;
pub mod service;
#[cfg(test)]
mod testing;
pub mod v1;
pub mod v2;
pub mod version;

// Re-exports
pub use config::ProtocolConfig;
pub use errors::{ErrorKind, ProtocolError};
pub use federation::{copy_federation_data, Federable, NetworkHop};
pub use filter::{FactFilter, Filter};
pub use message::{Reply, Request, SecureReply, SecureRequest, TransportMessage};
pub use service::EnvelopeService;
pub use version::{version_from_json, ProtocolVersion};

/// Agent that acts as the remote signing authority.
pub const REMOTE_SIGNING_AGENT: &str = "aaa_signer";

/// Agent used for node registration.
pub const REGISTRATION_AGENT: &str = "registration";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A new request id: 32 lower case hex characters.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_request_id_format() {
        let id = new_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_request_id());
    }
}
