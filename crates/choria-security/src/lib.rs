//! # Choria Security - Envelope Signing Strategies
//!
//! Every request and reply that crosses the bus is signed and verified through
//! a [`SecurityProvider`]. Exactly one provider is active per process.
//!
//! ## Providers
//!
//! | Provider | Technology | Identity | Signature |
//! |----------|------------|----------|-----------|
//! | [`FileSecurity`] | X.509 | PEM certificate | RSA PKCS#1 v1.5 over SHA-256 |
//! | [`ChoriaSecurity`] | Ed25519 + JWT | server or client JWT | raw Ed25519 |
//!
//! ## Supporting Modules
//!
//! - `tokens` - JWT claim shapes, parsing against trusted signers, issuing
//! - `ed25519` - seed-file key pairs and panic-free verification
//!
//! Remote (delegated) signing is reached through the [`RequestSigner`] port,
//! usually backed by an AAA service.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod choria;
pub mod ed25519;
pub mod errors;
pub mod file;
pub mod provider;
pub mod tokens;

// Re-exports
pub use choria::{ChoriaSecurity, ChoriaSecurityConfig};
pub use ed25519::Ed25519KeyPair;
pub use errors::{SecurityError, TokenError};
pub use file::{FileSecurity, FileSecurityConfig};
pub use provider::{RequestSigner, SecurityProvider, SecurityTechnology};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
