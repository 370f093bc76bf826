//! Protocol version identifiers.

use serde::{Deserialize, Serialize};

/// Every envelope names its type and version in the `protocol` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProtocolVersion {
    /// `choria:request:1`
    RequestV1,
    /// `choria:reply:1`
    ReplyV1,
    /// `choria:secure:request:1`
    SecureRequestV1,
    /// `choria:secure:reply:1`
    SecureReplyV1,
    /// `choria:transport:1`
    TransportV1,
    /// `io.choria.protocol.v2.request`
    RequestV2,
    /// `io.choria.protocol.v2.reply`
    ReplyV2,
    /// `io.choria.protocol.v2.secure_request`
    SecureRequestV2,
    /// `io.choria.protocol.v2.secure_reply`
    SecureReplyV2,
    /// `io.choria.protocol.v2.transport`
    TransportV2,
    /// Anything else
    Unknown,
}

impl ProtocolVersion {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestV1 => "choria:request:1",
            Self::ReplyV1 => "choria:reply:1",
            Self::SecureRequestV1 => "choria:secure:request:1",
            Self::SecureReplyV1 => "choria:secure:reply:1",
            Self::TransportV1 => "choria:transport:1",
            Self::RequestV2 => "io.choria.protocol.v2.request",
            Self::ReplyV2 => "io.choria.protocol.v2.reply",
            Self::SecureRequestV2 => "io.choria.protocol.v2.secure_request",
            Self::SecureReplyV2 => "io.choria.protocol.v2.secure_reply",
            Self::TransportV2 => "io.choria.protocol.v2.transport",
            Self::Unknown => "io.choria.protocol.unknown",
        }
    }

    /// Major protocol version, 0 when unknown.
    pub fn major(&self) -> u8 {
        match self {
            Self::RequestV1 | Self::ReplyV1 | Self::SecureRequestV1 | Self::SecureReplyV1 | Self::TransportV1 => 1,
            Self::RequestV2 | Self::ReplyV2 | Self::SecureRequestV2 | Self::SecureReplyV2 | Self::TransportV2 => 2,
            Self::Unknown => 0,
        }
    }
}

impl From<&str> for ProtocolVersion {
    fn from(value: &str) -> Self {
        match value {
            "choria:request:1" => Self::RequestV1,
            "choria:reply:1" => Self::ReplyV1,
            "choria:secure:request:1" => Self::SecureRequestV1,
            "choria:secure:reply:1" => Self::SecureReplyV1,
            "choria:transport:1" => Self::TransportV1,
            "io.choria.protocol.v2.request" => Self::RequestV2,
            "io.choria.protocol.v2.reply" => Self::ReplyV2,
            "io.choria.protocol.v2.secure_request" => Self::SecureRequestV2,
            "io.choria.protocol.v2.secure_reply" => Self::SecureReplyV2,
            "io.choria.protocol.v2.transport" => Self::TransportV2,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for ProtocolVersion {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct Detect {
    protocol: ProtocolVersion,
}

/// Protocol named by a JSON document, [`ProtocolVersion::Unknown`] when the
/// document cannot be parsed or names no known protocol.
pub fn version_from_json(data: &[u8]) -> ProtocolVersion {
    serde_json::from_slice::<Detect>(data)
        .map(|d| d.protocol)
        .unwrap_or(ProtocolVersion::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_forms_round_trip() {
        let all = [
            ProtocolVersion::RequestV1,
            ProtocolVersion::ReplyV1,
            ProtocolVersion::SecureRequestV1,
            ProtocolVersion::SecureReplyV1,
            ProtocolVersion::TransportV1,
            ProtocolVersion::RequestV2,
            ProtocolVersion::ReplyV2,
            ProtocolVersion::SecureRequestV2,
            ProtocolVersion::SecureReplyV2,
            ProtocolVersion::TransportV2,
            ProtocolVersion::Unknown,
        ];

        for v in all {
            assert_eq!(ProtocolVersion::from(v.as_str()), v);
        }
    }

    #[test]
    fn test_unknown_strings() {
        let v: ProtocolVersion = serde_json::from_str("\"choria:request:9\"").unwrap();
        assert_eq!(v, ProtocolVersion::Unknown);
        assert_eq!(v.major(), 0);
    }

    #[test]
    fn test_version_from_json() {
        assert_eq!(
            version_from_json(br#"{"protocol":"io.choria.protocol.v2.transport","data":""}"#),
            ProtocolVersion::TransportV2
        );
        assert_eq!(version_from_json(b"{}"), ProtocolVersion::Unknown);
        assert_eq!(version_from_json(b"garbage"), ProtocolVersion::Unknown);
    }

    #[test]
    fn test_major() {
        assert_eq!(ProtocolVersion::SecureReplyV1.major(), 1);
        assert_eq!(ProtocolVersion::TransportV2.major(), 2);
    }
}
