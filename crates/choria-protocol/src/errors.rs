//! Protocol error types.

use std::time::Duration;

use choria_security::{SecurityError, SecurityTechnology};
use thiserror::Error;

use crate::version::ProtocolVersion;

/// Broad error classes used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structurally invalid JSON or schema violations
    Encoding,
    /// Signing or verification failures, missing key material
    Crypto,
    /// Verified identity not entitled to act, delegation not honoured
    Authorization,
    /// Mismatched or unknown protocol versions
    ProtocolVersion,
}

/// Envelope errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Document does not pass schema validation
    #[error("supplied JSON document is not a valid {target} message: {reason}")]
    InvalidJson {
        /// Protocol the document was validated against
        target: ProtocolVersion,
        /// Joined schema errors
        reason: String,
    },

    /// An inner message could not be encoded into its wrapper
    #[error("could not JSON encode {what}: {source}")]
    Encode {
        /// What was being encoded
        what: &'static str,
        /// Underlying failure
        #[source]
        source: Box<ProtocolError>,
    },

    /// Serialization or parsing failed
    #[error("could not process JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The security provider does not suit this protocol version
    #[error("incorrect protocol specified, {required:?} security is required but {found:?} is in use")]
    IncorrectProtocol {
        /// Technology the protocol needs
        required: SecurityTechnology,
        /// Technology of the active provider
        found: SecurityTechnology,
    },

    /// Outer and inner envelopes are of different versions
    #[error("cannot create a {target} from a {found} message")]
    IncompatibleVersion {
        /// Envelope being built
        target: ProtocolVersion,
        /// Envelope it was built from
        found: ProtocolVersion,
    },

    /// JSON names a protocol this library does not handle here
    #[error("unsupported protocol {0}")]
    UnknownProtocol(ProtocolVersion),

    /// Remote signer response without a signer JWT
    #[error("remote signer did not set a signer JWT")]
    MissingSignerJwt,

    /// Security validation of a received message failed
    #[error("{0}")]
    ValidationFailed(&'static str),

    /// Remote signing did not finish in time
    #[error("remote signing timed out after {0:?}")]
    RemoteSignTimeout(Duration),

    /// Signing, token or certificate failures
    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl ProtocolError {
    /// Class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidJson { .. } | Self::Json(_) => ErrorKind::Encoding,
            Self::Encode { .. } => ErrorKind::Encoding,
            Self::IncorrectProtocol { .. } | Self::IncompatibleVersion { .. } | Self::UnknownProtocol(_) => {
                ErrorKind::ProtocolVersion
            }
            Self::MissingSignerJwt | Self::ValidationFailed(_) => ErrorKind::Authorization,
            Self::Security(SecurityError::CallerNotAllowed { .. }) => ErrorKind::Authorization,
            Self::Security(_) | Self::RemoteSignTimeout(_) => ErrorKind::Crypto,
        }
    }

    /// Whether a schema violation is at the root of this error.
    pub fn is_invalid_json(&self) -> bool {
        match self {
            Self::InvalidJson { .. } => true,
            Self::Encode { source, .. } => source.is_invalid_json(),
            _ => false,
        }
    }

    pub(crate) fn encode(what: &'static str, source: ProtocolError) -> Self {
        Self::Encode {
            what,
            source: Box::new(source),
        }
    }
}
