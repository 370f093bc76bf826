//! Claims shared by every Choria JWT.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// What a token may be used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Purpose {
    /// Absent or unrecognised purpose
    #[default]
    Unknown,
    /// A client identity
    ClientId,
    /// A provisioning token
    Provisioning,
    /// A server identity
    Server,
}

impl Purpose {
    /// Wire form of the purpose.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::ClientId => "choria_client_id",
            Self::Provisioning => "choria_provisioning",
            Self::Server => "choria_server",
        }
    }
}

impl From<String> for Purpose {
    fn from(value: String) -> Self {
        match value.as_str() {
            "choria_client_id" => Self::ClientId,
            "choria_provisioning" => Self::Provisioning,
            "choria_server" => Self::Server,
            _ => Self::Unknown,
        }
    }
}

impl From<Purpose> for String {
    fn from(value: Purpose) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_empty(s: &str) -> bool {
    s.is_empty()
}

/// Registered claims plus the Choria specific `purpose`, `tcs` and
/// `public_key` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardClaims {
    /// Token purpose
    #[serde(default)]
    pub purpose: Purpose,

    /// Trust chain signature from an organization issuer
    #[serde(rename = "tcs", default, skip_serializing_if = "is_empty")]
    pub trust_chain_signature: String,

    /// Hex encoded ed25519 public key of the token holder
    #[serde(default, skip_serializing_if = "is_empty")]
    pub public_key: String,

    /// Expiry of the issuer that signed this token
    #[serde(rename = "issexp", default, skip_serializing_if = "Option::is_none")]
    pub issuer_expires_at: Option<i64>,

    /// Issuer
    #[serde(default, skip_serializing_if = "is_empty")]
    pub iss: String,

    /// Subject
    #[serde(default, skip_serializing_if = "is_empty")]
    pub sub: String,

    /// Expiry, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not valid before, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued at, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Token id
    #[serde(default, skip_serializing_if = "is_empty")]
    pub jti: String,
}

impl StandardClaims {
    /// Claims issued now by `issuer` and valid for `validity`.
    pub fn new(issuer: &str, purpose: Purpose, validity: Duration, set_subject: bool) -> Self {
        let now = Utc::now();

        Self {
            purpose,
            iss: issuer.to_string(),
            sub: if set_subject { purpose.as_str().to_string() } else { String::new() },
            iat: Some(now.timestamp()),
            nbf: Some(now.timestamp() - 30),
            exp: Some((now + validity).timestamp()),
            ..Default::default()
        }
    }

    /// Expiry time, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|e| Utc.timestamp_opt(e, 0).single())
    }

    /// Whether the token is past its expiry time.
    pub fn is_expired(&self) -> bool {
        self.exp.map(|e| e < Utc::now().timestamp()).unwrap_or(false)
    }

    /// Whether the token expires before `now + within`.
    pub fn expires_within(&self, within: Duration) -> bool {
        self.exp.map(|e| e < (Utc::now() + within).timestamp()).unwrap_or(false)
    }
}
