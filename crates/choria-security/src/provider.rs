//! # Security Provider Strategy
//!
//! The capability set every envelope operation is written against. Envelope
//! code never touches keys directly; it asks the active provider to sign,
//! verify, checksum and hand out its own identity material.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::SecurityError;

static CALLER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+=([\w\.\-]+)").expect("caller id regex is valid"));

/// Cryptographic technology behind a provider.
///
/// Protocol v1 envelopes require [`SecurityTechnology::X509`], protocol v2
/// envelopes require [`SecurityTechnology::Ed25519Jwt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityTechnology {
    /// X.509 certificates with RSA keys
    X509,
    /// Ed25519 keys with JWT identities
    Ed25519Jwt,
}

/// Signs, verifies and authorizes envelope identities.
#[async_trait]
pub trait SecurityProvider: Send + Sync {
    /// Short provider name such as `file` or `choria`.
    fn provider(&self) -> &str;

    /// Technology used for keys and identities.
    fn backing_technology(&self) -> SecurityTechnology;

    /// Identity of this process, usually the certname.
    fn identity(&self) -> &str;

    /// Caller id requests made by this process carry, like `choria=bob`.
    fn caller_name(&self) -> String;

    /// Extracts the certname part of a caller id.
    fn caller_identity(&self, caller: &str) -> Result<String, SecurityError> {
        CALLER_ID
            .captures(caller)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SecurityError::InvalidCallerId(caller.to_string()))
    }

    /// Signs `data` with the private key of this identity.
    fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError>;

    /// Verifies `signature` over `data` using the supplied public identity
    /// material. Malformed input yields `(false, "")`, never a panic.
    ///
    /// Returns whether the signature is valid and the name of the signer.
    fn verify_signature_bytes(
        &self,
        data: &[u8],
        signature: &[u8],
        public: &[&[u8]],
    ) -> (bool, String);

    /// SHA-256 of `data`.
    fn checksum_bytes(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    /// This identity's own public material: a JWT in v2, a PEM certificate in v1.
    fn token_bytes(&self) -> Result<Vec<u8>, SecurityError>;

    /// Decides if the public identity material may act as `caller`.
    ///
    /// `Ok(true)` marks a privileged or delegated caller, `Ok(false)` an
    /// ordinary allowed caller, and any error a refusal.
    fn should_allow_caller(&self, caller: &str, public: &[&[u8]]) -> Result<bool, SecurityError>;

    /// Asks the configured remote signer to sign a request document.
    async fn remote_sign_request(&self, request: &[u8]) -> Result<Vec<u8>, SecurityError>;

    /// Whether a remote signer is configured.
    fn is_remote_signing(&self) -> bool;

    /// Whether this identity signs requests on behalf of others. A signing
    /// authority never sends its own requests for remote signing.
    fn is_signing_authority(&self) -> bool {
        false
    }
}

/// Port to a remote signing authority.
///
/// Receives a request JSON document and returns a complete, already signed
/// secure request JSON document that carries the authority's signer JWT.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Name of the signer implementation.
    fn kind(&self) -> &str;

    /// Signs `request` on behalf of the caller.
    async fn sign(&self, request: &[u8]) -> Result<Vec<u8>, SecurityError>;
}
