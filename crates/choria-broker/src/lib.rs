//! # Choria Broker - Connection Authorization
//!
//! [`ChoriaAuth`] is consulted once for every connection the broker accepts.
//! It either registers a [`User`] with a complete permission set or denies
//! the connection, logging why.
//!
//! ## Connection Paths
//!
//! | Connection | Handler | Account |
//! |------------|---------|---------|
//! | username `provisioner` | provisioning user | provisioning |
//! | system user over verified TLS or a pipe | verified system account | system |
//! | system user over unverified TLS with a JWT | unverified system account | system |
//! | mTLS, JWT plus nonce signature, pipe | default connection | choria |
//! | unverified TLS with a provisioning token | unverified provisioning | provisioning |
//!
//! ## Supporting Modules
//!
//! - `acl` - client and server permission builders
//! - `signers` - JWT signer and organization issuer resolution
//! - `allow_list` - client IP and CIDR allow list
//! - `subjects` - private reply subjects and wildcard matching

#![warn(missing_docs)]
#![warn(clippy::all)]

mod acl;
pub mod allow_list;
pub mod auth;
pub mod config;
pub mod connection;
pub mod errors;
pub mod permissions;
pub mod signers;
pub mod subjects;

// Re-exports
pub use allow_list::ClientAllowList;
pub use auth::ChoriaAuth;
pub use config::BrokerAuthConfig;
pub use connection::{
    ClientAuthentication, ConnectOptions, ConnectionKind, RemoteAddress, TlsConnectionState,
};
pub use errors::{AuthError, ConfigError};
pub use permissions::{Account, Permissions, ResponsePermission, SubjectPermission, User};
pub use signers::Signers;

/// Username reserved for the provisioning service.
pub const PROVISIONING_USER: &str = "provisioner";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
