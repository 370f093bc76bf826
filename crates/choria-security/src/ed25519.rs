//! # Ed25519 Keys
//!
//! Seed-file backed key pairs and verification helpers for protocol v2 and
//! broker nonce checks.
//!
//! Seeds are stored on disk as 64 hex characters. Verification with a key or
//! signature of the wrong length is an error, never a panic.

use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

use crate::SecurityError;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Ed25519 keypair.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Load a hex encoded seed file.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, SecurityError> {
        let path = path.as_ref();
        let mut content = std::fs::read_to_string(path).map_err(|source| SecurityError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let decoded = hex::decode(content.trim());
        content.zeroize();

        let mut raw = decoded.map_err(|e| SecurityError::InvalidSeed(e.to_string()))?;
        let seed: Result<[u8; 32], _> = raw.as_slice().try_into();
        raw.zeroize();

        let mut seed = seed.map_err(|_| SecurityError::InvalidSeed("seed must be 32 bytes".into()))?;
        let pair = Self::from_seed(seed);
        seed.zeroize();

        Ok(pair)
    }

    /// Write the seed as hex to `path`.
    pub fn save_seed_file(&self, path: impl AsRef<Path>) -> Result<(), SecurityError> {
        let path = path.as_ref();
        let mut encoded = hex::encode(self.signing_key.to_bytes());
        let res = std::fs::write(path, &encoded).map_err(|source| SecurityError::Io {
            path: path.to_path_buf(),
            source,
        });
        encoded.zeroize();

        res
    }

    /// Get the verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public key as lower case hex, the form embedded in JWT claims.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    /// Sign a message (deterministic - no RNG needed).
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Access the signing key, used when issuing JWTs.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl Drop for Ed25519KeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Parse a raw 32 byte public key.
pub fn verifying_key(public_key: &[u8]) -> Result<VerifyingKey, SecurityError> {
    let raw: [u8; PUBLIC_KEY_LENGTH] = public_key.try_into().map_err(|_| {
        SecurityError::InvalidKey(format!("invalid public key length {}", public_key.len()))
    })?;

    VerifyingKey::from_bytes(&raw).map_err(|e| SecurityError::InvalidKey(e.to_string()))
}

/// Parse a hex encoded public key.
pub fn verifying_key_from_hex(public_key: &str) -> Result<VerifyingKey, SecurityError> {
    let raw = hex::decode(public_key).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
    verifying_key(&raw)
}

/// Verify `signature` over `message`.
///
/// Bad key or signature lengths are reported as errors, a signature that
/// simply does not match is `Ok(false)`.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, SecurityError> {
    let key = verifying_key(public_key)?;

    let sig: [u8; SIGNATURE_LENGTH] = signature.try_into().map_err(|_| {
        SecurityError::InvalidKey(format!("invalid signature length {}", signature.len()))
    })?;

    Ok(key.verify(message, &Signature::from_bytes(&sig)).is_ok())
}
