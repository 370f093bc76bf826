//! Provisioning tokens, embedded in unprovisioned servers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::standard::StandardClaims;

/// Claims carried by a `choria_provisioning` token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningClaims {
    /// Token passed to the provisioner
    #[serde(rename = "cht", default)]
    pub token: String,

    /// Whether provisioning uses TLS
    #[serde(rename = "chs", default)]
    pub secure: bool,

    /// Broker URLs
    #[serde(rename = "chu", default, skip_serializing_if = "String::is_empty")]
    pub urls: String,

    /// SRV domain used to find brokers
    #[serde(rename = "chsrv", default, skip_serializing_if = "String::is_empty")]
    pub srv_domain: String,

    /// Whether servers provision by default
    #[serde(rename = "chpd", default)]
    pub provision_default: bool,

    /// Registration data file
    #[serde(rename = "chrd", default, skip_serializing_if = "String::is_empty")]
    pub registration_data: String,

    /// Facts file
    #[serde(rename = "chf", default, skip_serializing_if = "String::is_empty")]
    pub facts: String,

    /// Broker username for provisioning
    #[serde(rename = "chusr", default, skip_serializing_if = "String::is_empty")]
    pub broker_user: String,

    /// Broker password for provisioning
    #[serde(rename = "chpwd", default, skip_serializing_if = "String::is_empty")]
    pub broker_password: String,

    /// Site specific extensions
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,

    /// Registered claims
    #[serde(flatten)]
    pub standard: StandardClaims,
}
