//! Server identity tokens.

use serde::{Deserialize, Serialize};

use super::standard::StandardClaims;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Capabilities granted to a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPermissions {
    /// May submit messages to Choria Submission
    #[serde(default, skip_serializing_if = "is_false")]
    pub submission: bool,

    /// May use Choria Streams
    #[serde(default, skip_serializing_if = "is_false")]
    pub streams: bool,

    /// May host services
    #[serde(default, skip_serializing_if = "is_false")]
    pub service_host: bool,

    /// May use governors
    #[serde(default, skip_serializing_if = "is_false")]
    pub governor: bool,
}

/// Claims carried by a `choria_server` token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerClaims {
    /// Server identity
    #[serde(default)]
    pub identity: String,

    /// Collectives the server may join
    #[serde(default)]
    pub collectives: Vec<String>,

    /// Capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<ServerPermissions>,

    /// Organization unit, `choria` when empty
    #[serde(rename = "ou", default, skip_serializing_if = "String::is_empty")]
    pub organization_unit: String,

    /// Extra subjects this server may publish to
    #[serde(rename = "pub_subjects", default, skip_serializing_if = "Vec::is_empty")]
    pub additional_publish_subjects: Vec<String>,

    /// Registered claims
    #[serde(flatten)]
    pub standard: StandardClaims,
}

impl ServerClaims {
    /// Permission set, empty when the token carries none.
    pub fn perms(&self) -> ServerPermissions {
        self.permissions.clone().unwrap_or_default()
    }
}
