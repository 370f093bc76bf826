//! # Protocol Configuration
//!
//! Behaviour switches shared by every envelope operation. One value is built
//! at process start and handed to each consumer.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CHORIA_SECURE` | `secure` |
//! | `CHORIA_STRICT_VALIDATION` | `client_strict_validation` |
//! | `CHORIA_REMOTE_SIGN_TIMEOUT_SECS` | `remote_sign_timeout` |

use std::time::Duration;

use tracing::warn;

use crate::{REGISTRATION_AGENT, REMOTE_SIGNING_AGENT};

/// Envelope behaviour settings.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Sign and verify envelopes. When false every signature is the literal
    /// `insecure` and validation always passes.
    pub secure: bool,
    /// Schema validate Reply and TransportMessage documents too.
    pub client_strict_validation: bool,
    /// Agents that receive version 1 requests unsigned. Defaults to the
    /// remote signing agent, which authenticates callers itself.
    pub unsigned_agents: Vec<String>,
    /// Agents that may fall back to unsigned messages when signing fails.
    pub registration_agents: Vec<String>,
    /// Upper bound for a remote signing round trip.
    pub remote_sign_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            secure: true,
            client_strict_validation: false,
            unsigned_agents: vec![REMOTE_SIGNING_AGENT.to_string()],
            registration_agents: vec![REGISTRATION_AGENT.to_string()],
            remote_sign_timeout: Duration::from_secs(10),
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

impl ProtocolConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("CHORIA_SECURE") {
            match parse_bool(&value) {
                Some(secure) => config.secure = secure,
                None => warn!(value = %value, "CHORIA_SECURE must be true or false"),
            }
        }

        if let Ok(value) = std::env::var("CHORIA_STRICT_VALIDATION") {
            match parse_bool(&value) {
                Some(strict) => config.client_strict_validation = strict,
                None => warn!(value = %value, "CHORIA_STRICT_VALIDATION must be true or false"),
            }
        }

        if let Ok(value) = std::env::var("CHORIA_REMOTE_SIGN_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => config.remote_sign_timeout = Duration::from_secs(secs),
                _ => warn!(value = %value, "CHORIA_REMOTE_SIGN_TIMEOUT_SECS must be a positive integer"),
            }
        }

        config
    }

    /// Defaults with signing and verification disabled.
    pub fn insecure() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }

    /// Whether version 1 requests to `agent` go out unsigned.
    pub fn is_unsigned_agent(&self, agent: &str) -> bool {
        self.unsigned_agents.iter().any(|a| a == agent)
    }

    /// Whether `agent` is a registration agent.
    pub fn is_registration_agent(&self, agent: &str) -> bool {
        self.registration_agents.iter().any(|a| a == agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::default();
        assert!(config.secure);
        assert!(!config.client_strict_validation);
        assert!(config.is_unsigned_agent("aaa_signer"));
        assert!(!config.is_unsigned_agent("rpcutil"));
        assert!(config.is_registration_agent("registration"));
    }

    #[test]
    fn test_insecure() {
        assert!(!ProtocolConfig::insecure().secure);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
