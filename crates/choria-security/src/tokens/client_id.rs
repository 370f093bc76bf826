//! Client identity tokens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::standard::StandardClaims;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Capabilities granted to a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPermissions {
    /// Full administrative access to Choria Streams
    #[serde(default, skip_serializing_if = "is_false")]
    pub streams_admin: bool,

    /// Use of Choria Streams without administration
    #[serde(default, skip_serializing_if = "is_false")]
    pub streams_user: bool,

    /// May view lifecycle and autonomous agent events
    #[serde(default, skip_serializing_if = "is_false")]
    pub events_viewer: bool,

    /// May participate in leader elections
    #[serde(default, skip_serializing_if = "is_false")]
    pub election_user: bool,

    /// Organization administrator, unrestricted subjects
    #[serde(default, skip_serializing_if = "is_false")]
    pub org_admin: bool,

    /// May run long lived services
    #[serde(default, skip_serializing_if = "is_false")]
    pub service: bool,

    /// May publish RPC requests to the fleet
    #[serde(default, skip_serializing_if = "is_false")]
    pub fleet_management: bool,

    /// May publish RPC requests, but only when counter signed by an authority
    #[serde(default, skip_serializing_if = "is_false")]
    pub signed_fleet_management: bool,

    /// May sign requests on behalf of other callers
    #[serde(default, skip_serializing_if = "is_false")]
    pub authentication_delegator: bool,

    /// May connect as the broker system user
    #[serde(default, skip_serializing_if = "is_false")]
    pub system_user: bool,

    /// May provision servers
    #[serde(default, skip_serializing_if = "is_false")]
    pub server_provisioner: bool,

    /// May use governors
    #[serde(default, skip_serializing_if = "is_false")]
    pub governor: bool,
}

/// Claims carried by a `choria_client_id` token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdClaims {
    /// Caller id, like `up=bob`
    #[serde(default)]
    pub callerid: String,

    /// Agents this client may invoke
    #[serde(rename = "agents", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_agents: Vec<String>,

    /// Organization unit, `choria` when empty
    #[serde(rename = "ou", default, skip_serializing_if = "String::is_empty")]
    pub organization_unit: String,

    /// Free form user properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_properties: BTreeMap<String, String>,

    /// Open Policy Agent policy
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub opa_policy: String,

    /// Capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<ClientPermissions>,

    /// Extra subjects this client may publish to
    #[serde(rename = "pub_subjects", default, skip_serializing_if = "Vec::is_empty")]
    pub additional_publish_subjects: Vec<String>,

    /// Extra subjects this client may subscribe to
    #[serde(rename = "sub_subjects", default, skip_serializing_if = "Vec::is_empty")]
    pub additional_subscribe_subjects: Vec<String>,

    /// Registered claims
    #[serde(flatten)]
    pub standard: StandardClaims,
}

impl ClientIdClaims {
    /// Permission set, empty when the token carries none.
    pub fn perms(&self) -> ClientPermissions {
        self.permissions.clone().unwrap_or_default()
    }

    /// May publish fleet requests, signed or not.
    pub fn has_fleet_access(&self) -> bool {
        self.permissions
            .as_ref()
            .map(|p| p.fleet_management || p.signed_fleet_management)
            .unwrap_or(false)
    }

    /// May sign on behalf of other callers.
    pub fn is_delegator(&self) -> bool {
        self.permissions.as_ref().map(|p| p.authentication_delegator).unwrap_or(false)
    }
}
