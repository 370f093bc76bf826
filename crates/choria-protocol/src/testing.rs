//! Hand written security provider used by the unit tests.

use std::time::Duration;

use async_trait::async_trait;
use choria_security::{SecurityError, SecurityProvider, SecurityTechnology};

/// Signs with `sha256(identity || data)` and uses the identity as its
/// token, so any public data can verify a signature made by that identity.
#[derive(Debug, Clone)]
pub(crate) struct FakeSecurity {
    technology: SecurityTechnology,
    identity: String,
    allow: bool,
    broken: bool,
    authority: bool,
    remote: Option<Vec<u8>>,
    remote_delay: Option<Duration>,
}

impl FakeSecurity {
    pub(crate) fn new(technology: SecurityTechnology, identity: &str) -> Self {
        Self {
            technology,
            identity: identity.to_string(),
            allow: true,
            broken: false,
            authority: false,
            remote: None,
            remote_delay: None,
        }
    }

    /// Refuse every caller.
    pub(crate) fn denying(mut self) -> Self {
        self.allow = false;
        self
    }

    /// Fail to sign or produce a token.
    pub(crate) fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Act as a signing authority.
    pub(crate) fn authority(mut self) -> Self {
        self.authority = true;
        self
    }

    /// Answer remote signing requests with `response`.
    pub(crate) fn with_remote(mut self, response: Vec<u8>) -> Self {
        self.remote = Some(response);
        self
    }

    pub(crate) fn with_remote_delay(mut self, delay: Duration) -> Self {
        self.remote_delay = Some(delay);
        self
    }

    fn signature(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        self.checksum_bytes(&[key, data].concat())
    }
}

#[async_trait]
impl SecurityProvider for FakeSecurity {
    fn provider(&self) -> &str {
        "fake"
    }

    fn backing_technology(&self) -> SecurityTechnology {
        self.technology
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn caller_name(&self) -> String {
        format!("choria={}", self.identity)
    }

    fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if self.broken {
            return Err(SecurityError::SigningFailed("key unavailable".into()));
        }

        Ok(self.signature(self.identity.as_bytes(), data))
    }

    fn verify_signature_bytes(&self, data: &[u8], signature: &[u8], public: &[&[u8]]) -> (bool, String) {
        for key in public {
            if self.signature(key, data) == signature {
                return (true, String::from_utf8_lossy(key).into_owned());
            }
        }

        (false, String::new())
    }

    fn token_bytes(&self) -> Result<Vec<u8>, SecurityError> {
        if self.broken {
            return Err(SecurityError::SigningFailed("key unavailable".into()));
        }

        Ok(self.identity.as_bytes().to_vec())
    }

    fn should_allow_caller(&self, caller: &str, public: &[&[u8]]) -> Result<bool, SecurityError> {
        if public.is_empty() {
            return Err(SecurityError::NoPublicData);
        }

        if !self.allow {
            return Err(SecurityError::CallerNotAllowed {
                caller: caller.to_string(),
                reason: "denied by test provider".into(),
            });
        }

        Ok(public.len() > 1)
    }

    async fn remote_sign_request(&self, _request: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if let Some(delay) = self.remote_delay {
            tokio::time::sleep(delay).await;
        }

        self.remote.clone().ok_or(SecurityError::RemoteSigningNotConfigured)
    }

    fn is_remote_signing(&self) -> bool {
        self.remote.is_some()
    }

    fn is_signing_authority(&self) -> bool {
        self.authority
    }
}
