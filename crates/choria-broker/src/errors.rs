//! Broker authorization error types.
//!
//! Reasons are only ever logged by the broker. The connecting peer sees a
//! generic authorization failure.

use choria_security::tokens::Purpose;
use choria_security::TokenError;
use thiserror::Error;

use crate::connection::ConnectionKind;

/// Why a connection was denied.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Denied for a fixed reason
    #[error("{0}")]
    Denied(&'static str),

    /// A JWT was presented on a connection that is not a client connection
    #[error("a {purpose} JWT was presented by a {kind} connection")]
    WrongConnectionKind {
        /// `client` or `server`
        purpose: &'static str,
        /// Kind of the offending connection
        kind: ConnectionKind,
    },

    /// The token purpose has no handler
    #[error("do not know how to handle {0} purpose token")]
    UnsupportedPurpose(Purpose),

    /// Provisioner token without the `server_provisioner` permission
    #[error("provisioner claim is false in token with caller id '{0}'")]
    NotProvisioner(String),

    /// The configured provisioning signer is missing on disk
    #[error("provisioning signer certificate {0} does not exist")]
    ProvisioningSignerMissing(String),

    /// Nonce signature is not valid raw URL base64
    #[error("invalid url encoded signature: {0}")]
    SignatureEncoding(String),

    /// Nonce signature could not be checked at all
    #[error("could not verify nonce signature: {0}")]
    NonceVerification(String),

    /// Every configured signer rejected the token
    #[error("could not parse {kind} token with any of {count} signer identities")]
    NoMatchingSigner {
        /// `client` or `server`
        kind: &'static str,
        /// Number of signers tried
        count: usize,
    },

    /// No organization issuer for the token's `ou`
    #[error("no issuer found for ou {0}")]
    UnknownIssuer(String),

    /// The issuer for the token's `ou` is not a valid key
    #[error("invalid issuer public key: {0}")]
    InvalidIssuer(String),

    /// The issuer for the token's `ou` did not sign it
    #[error("failed to parse token issued by the {ou} chain: {source}")]
    IssuerChain {
        /// Organization unit named in the token
        ou: String,
        /// Underlying failure
        #[source]
        source: TokenError,
    },

    /// Token parsing failures
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Problems found while validating a [`BrokerAuthConfig`](crate::BrokerAuthConfig).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid broker configuration: {}", .0.join(", "))]
pub struct ConfigError(pub Vec<String>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            AuthError::Denied("password required").to_string(),
            "password required"
        );
        assert_eq!(
            AuthError::WrongConnectionKind {
                purpose: "client",
                kind: ConnectionKind::Router
            }
            .to_string(),
            "a client JWT was presented by a router connection"
        );
        assert_eq!(
            AuthError::NoMatchingSigner {
                kind: "server",
                count: 2
            }
            .to_string(),
            "could not parse server token with any of 2 signer identities"
        );
        assert_eq!(
            AuthError::UnsupportedPurpose(Purpose::Provisioning).to_string(),
            "do not know how to handle choria_provisioning purpose token"
        );
    }

    #[test]
    fn test_config_error_lists_all_problems() {
        let err = ConfigError(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid broker configuration: a, b");
    }
}
