//! # Choria JWTs
//!
//! Server, client and provisioning tokens, verified against trusted signer
//! keys. Ed25519 signers verify `EdDSA` tokens, RSA signers (PEM public keys
//! or certificates) verify `RS256` tokens.

mod client_id;
mod provisioning;
mod server;
mod standard;

use std::path::Path;

use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use client_id::{ClientIdClaims, ClientPermissions};
pub use provisioning::ProvisioningClaims;
pub use server::{ServerClaims, ServerPermissions};
pub use standard::{Purpose, StandardClaims};

use crate::errors::TokenError;

/// A key trusted to have signed tokens.
#[derive(Debug, Clone)]
pub enum SignerKey {
    /// Ed25519 public key
    Ed25519(VerifyingKey),
    /// PEM encoded RSA public key or certificate
    RsaPem(Vec<u8>),
}

impl SignerKey {
    /// Parse 64 hex characters into an Ed25519 signer.
    pub fn from_hex(hex_key: &str) -> Result<Self, TokenError> {
        crate::ed25519::verifying_key_from_hex(hex_key)
            .map(Self::Ed25519)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))
    }

    /// Load a PEM file holding an RSA public key or certificate.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let path = path.as_ref();
        std::fs::read(path)
            .map(Self::RsaPem)
            .map_err(|e| TokenError::InvalidKey(format!("{}: {}", path.display(), e)))
    }

    fn decoding_key(&self) -> Result<(DecodingKey, Algorithm), TokenError> {
        match self {
            Self::Ed25519(key) => Ok((DecodingKey::from_ed_der(key.as_bytes()), Algorithm::EdDSA)),
            Self::RsaPem(data) => {
                let block = pem::parse(data).map_err(|e| TokenError::InvalidKey(e.to_string()))?;

                let key = if block.tag() == "CERTIFICATE" {
                    let (_, cert) = x509_parser::parse_x509_certificate(block.contents())
                        .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
                    DecodingKey::from_rsa_der(&cert.public_key().subject_public_key.data)
                } else {
                    DecodingKey::from_rsa_pem(data)?
                };

                Ok((key, Algorithm::RS256))
            }
        }
    }
}

/// Key material used to issue tokens.
pub enum TokenSigner<'a> {
    /// Ed25519 private key, produces `EdDSA` tokens
    Ed25519(&'a SigningKey),
    /// PEM encoded RSA private key, produces `RS256` tokens
    RsaPem(&'a [u8]),
}

/// Issue a signed token.
pub fn sign_token<T: Serialize>(claims: &T, signer: TokenSigner<'_>) -> Result<String, TokenError> {
    let (key, alg) = match signer {
        TokenSigner::Ed25519(key) => {
            let der = key.to_pkcs8_der().map_err(|e| TokenError::InvalidKey(e.to_string()))?;
            (EncodingKey::from_ed_der(der.as_bytes()), Algorithm::EdDSA)
        }
        TokenSigner::RsaPem(pem) => (EncodingKey::from_rsa_pem(pem)?, Algorithm::RS256),
    };

    Ok(jsonwebtoken::encode(&Header::new(alg), claims, &key)?)
}

fn verified<T: DeserializeOwned>(token: &str, key: &SignerKey) -> Result<T, TokenError> {
    let (decoding, alg) = key.decoding_key()?;

    let mut validation = Validation::new(alg);
    validation.required_spec_claims.clear();
    validation.validate_aud = false;
    validation.validate_nbf = true;

    Ok(jsonwebtoken::decode::<T>(token, &decoding, &validation)?.claims)
}

/// Decode claims without verifying the signature or expiry.
///
/// Only for routing decisions, never for trust decisions.
pub fn parse_unverified<T: DeserializeOwned>(token: &str) -> Result<T, TokenError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    Ok(jsonwebtoken::decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)?.claims)
}

/// Purpose of a token without verifying it.
///
/// Tokens using the legacy `sub` claim for provisioning are recognised too.
pub fn token_purpose(token: &str) -> Purpose {
    match parse_unverified::<StandardClaims>(token) {
        Ok(claims) if claims.purpose == Purpose::Unknown && claims.sub == "choria_provisioning" => {
            Purpose::Provisioning
        }
        Ok(claims) => claims.purpose,
        Err(_) => Purpose::Unknown,
    }
}

/// Whether the token claims to be a client id token.
pub fn is_client_id_token(token: &str) -> bool {
    token_purpose(token) == Purpose::ClientId
}

/// Whether the token claims to be a server token.
pub fn is_server_token(token: &str) -> bool {
    token_purpose(token) == Purpose::Server
}

/// Verify and parse a client id token.
pub fn parse_client_id_token(
    token: &str,
    key: &SignerKey,
    verify_purpose: bool,
) -> Result<ClientIdClaims, TokenError> {
    let claims: ClientIdClaims = verified(token, key)?;

    if verify_purpose && claims.standard.purpose != Purpose::ClientId {
        return Err(TokenError::NotClientToken);
    }

    if claims.callerid.is_empty() {
        return Err(TokenError::InvalidCallerId);
    }

    Ok(claims)
}

/// Verify and parse a server token.
pub fn parse_server_token(token: &str, key: &SignerKey) -> Result<ServerClaims, TokenError> {
    let claims: ServerClaims = verified(token, key)?;

    if claims.standard.purpose != Purpose::Server {
        return Err(TokenError::NotServerToken);
    }

    Ok(claims)
}

/// Verify and parse a provisioning token.
pub fn parse_provisioning_token(
    token: &str,
    key: &SignerKey,
) -> Result<ProvisioningClaims, TokenError> {
    let claims: ProvisioningClaims = verified(token, key)?;

    let purpose = match claims.standard.purpose {
        Purpose::Unknown if claims.standard.sub == "choria_provisioning" => Purpose::Provisioning,
        p => p,
    };

    if purpose != Purpose::Provisioning {
        return Err(TokenError::NotProvisioningToken);
    }

    Ok(claims)
}
