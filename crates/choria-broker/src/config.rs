//! # Broker Authorization Configuration
//!
//! Written once at startup and only read afterwards.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CHORIA_BROKER_ALLOW_LIST` | `client_allow_list` (comma separated) |
//! | `CHORIA_BROKER_TLS` | `tls` |
//! | `CHORIA_BROKER_DENY_SERVERS` | `deny_servers` |
//! | `CHORIA_BROKER_PROVISIONING_SIGNER` | `provisioning_token_signer` |
//! | `CHORIA_BROKER_CLIENT_SIGNERS` | `client_jwt_signers` (comma separated) |
//! | `CHORIA_BROKER_SERVER_SIGNERS` | `server_jwt_signers` (comma separated) |
//! | `CHORIA_BROKER_ISSUERS` | `issuers` (`ou=key` pairs, comma separated) |
//! | `CHORIA_BROKER_SYSTEM_USER` | `system_user` |
//! | `CHORIA_BROKER_SYSTEM_PASSWORD` | `system_password` |
//! | `CHORIA_BROKER_PROVISIONING_PASSWORD` | `provisioning_password` |

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::warn;

use crate::allow_list::Cidr;
use crate::errors::ConfigError;

/// Settings consumed by [`ChoriaAuth`](crate::ChoriaAuth).
#[derive(Debug, Clone)]
pub struct BrokerAuthConfig {
    /// Hosts and CIDRs that may act as clients
    pub client_allow_list: Vec<String>,
    /// The broker requires TLS
    pub tls: bool,
    /// Deny all publish and subscribe to servers
    pub deny_servers: bool,
    /// Certificate that signs provisioning tokens, enables provisioning
    pub provisioning_token_signer: Option<PathBuf>,
    /// Client JWT signers, 64 hex characters for ed25519 or a PEM path
    pub client_jwt_signers: Vec<String>,
    /// Server JWT signers, 64 hex characters for ed25519 or a PEM path
    pub server_jwt_signers: Vec<String>,
    /// Organization issuers keyed by organization unit
    pub issuers: BTreeMap<String, String>,
    /// Account for fleet traffic, `None` uses the default account
    pub choria_account: Option<String>,
    /// Account for broker administration
    pub system_account: Option<String>,
    /// Account for provisioning traffic
    pub provisioning_account: Option<String>,
    /// Password of the `provisioner` user, empty disables the user
    pub provisioning_password: String,
    /// System account username
    pub system_user: String,
    /// System account password
    pub system_password: String,
}

impl Default for BrokerAuthConfig {
    fn default() -> Self {
        Self {
            client_allow_list: Vec::new(),
            tls: true,
            deny_servers: false,
            provisioning_token_signer: None,
            client_jwt_signers: Vec::new(),
            server_jwt_signers: Vec::new(),
            issuers: BTreeMap::new(),
            choria_account: Some("choria".to_string()),
            system_account: Some("system".to_string()),
            provisioning_account: Some("provisioning".to_string()),
            provisioning_password: String::new(),
            system_user: String::new(),
            system_password: String::new(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn is_ed25519_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl BrokerAuthConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("CHORIA_BROKER_ALLOW_LIST") {
            config.client_allow_list = parse_list(&value);
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_TLS") {
            match parse_bool(&value) {
                Some(tls) => config.tls = tls,
                None => warn!(value = %value, "CHORIA_BROKER_TLS must be true or false"),
            }
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_DENY_SERVERS") {
            match parse_bool(&value) {
                Some(deny) => config.deny_servers = deny,
                None => warn!(value = %value, "CHORIA_BROKER_DENY_SERVERS must be true or false"),
            }
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_PROVISIONING_SIGNER") {
            if !value.is_empty() {
                config.provisioning_token_signer = Some(PathBuf::from(value));
            }
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_CLIENT_SIGNERS") {
            config.client_jwt_signers = parse_list(&value);
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_SERVER_SIGNERS") {
            config.server_jwt_signers = parse_list(&value);
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_ISSUERS") {
            for pair in parse_list(&value) {
                match pair.split_once('=') {
                    Some((ou, key)) => {
                        config.issuers.insert(ou.trim().to_string(), key.trim().to_string());
                    }
                    None => warn!(entry = %pair, "CHORIA_BROKER_ISSUERS entries must be ou=key"),
                }
            }
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_SYSTEM_USER") {
            config.system_user = value;
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_SYSTEM_PASSWORD") {
            config.system_password = value;
        }

        if let Ok(value) = std::env::var("CHORIA_BROKER_PROVISIONING_PASSWORD") {
            config.provisioning_password = value;
        }

        config
    }

    /// Report every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if !self.system_user.is_empty() && self.system_password.is_empty() {
            errors.push("system_password is required when system_user is set".to_string());
        }

        if self.system_user.is_empty() && !self.system_password.is_empty() {
            errors.push("system_user is required when system_password is set".to_string());
        }

        for entry in self.client_allow_list.iter().filter(|e| e.contains('/')) {
            if let Err(e) = Cidr::parse(entry) {
                errors.push(format!("client_allow_list: {}", e));
            }
        }

        for signer in self.client_jwt_signers.iter().chain(&self.server_jwt_signers) {
            if signer.len() == 64 && !is_ed25519_hex(signer) {
                errors.push(format!("signer {} is not a valid ed25519 public key", signer));
            }
        }

        for (ou, key) in &self.issuers {
            if !is_ed25519_hex(key) {
                errors.push(format!("issuer for ou {} is not a valid ed25519 public key", ou));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(errors))
        }
    }
}
