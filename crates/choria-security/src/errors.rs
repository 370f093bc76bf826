//! Security error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by security providers.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A key, seed, token or certificate file could not be read
    #[error("could not read {path}: {source}")]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The Ed25519 seed is not 32 hex encoded bytes
    #[error("invalid ed25519 seed: {0}")]
    InvalidSeed(String),

    /// A private or public key could not be decoded
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A certificate could not be parsed
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A certificate is not signed by the CA, expired, or names someone else
    #[error("certificate verification failed: {0}")]
    CertificateVerification(String),

    /// Producing a signature failed
    #[error("could not sign message: {0}")]
    SigningFailed(String),

    /// The caller string does not carry an identity
    #[error("could not find a valid certificate name in {0}")]
    InvalidCallerId(String),

    /// No public identity material was supplied for verification
    #[error("no public keys or tokens supplied")]
    NoPublicData,

    /// The verified identity may not act as the claimed caller
    #[error("caller {caller} is not allowed: {reason}")]
    CallerNotAllowed {
        /// Caller id that was claimed
        caller: String,
        /// Why it was refused
        reason: String,
    },

    /// No remote signer is configured
    #[error("remote signing not configured")]
    RemoteSigningNotConfigured,

    /// The remote signer failed
    #[error("remote signing failed: {0}")]
    RemoteSigning(String),

    /// JWT handling failed
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Provider configuration is incomplete
    #[error("invalid security configuration: {}", .0.join(", "))]
    Config(Vec<String>),
}

/// Errors raised while parsing or issuing JWTs.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature, encoding or claim validation failed
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    /// The token is past its expiry time
    #[error("token has expired")]
    Expired,

    /// Purpose is not `choria_client_id`
    #[error("not a client id token")]
    NotClientToken,

    /// Purpose is not `choria_server`
    #[error("not a server token")]
    NotServerToken,

    /// Purpose is not `choria_provisioning`
    #[error("not a provisioning token")]
    NotProvisioningToken,

    /// A client token without a caller id
    #[error("no caller id in token")]
    InvalidCallerId,

    /// A signer or token key could not be loaded
    #[error("invalid token key: {0}")]
    InvalidKey(String),

    /// A required claim is absent
    #[error("{0} not in claims")]
    MissingClaim(&'static str),
}

impl TokenError {
    /// Errors that no other signer could fix, so searching stops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Expired
                | Self::NotClientToken
                | Self::NotServerToken
                | Self::NotProvisioningToken
                | Self::InvalidCallerId
        )
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Invalid(err),
        }
    }
}
