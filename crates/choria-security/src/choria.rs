//! # Ed25519 + JWT Security
//!
//! Protocol v2 provider. Every process holds an ed25519 seed and a JWT issued
//! by a trusted signer that embeds the matching public key. Signatures are
//! raw ed25519 over the exact message bytes; the verifying key is taken from
//! the sender's JWT after that JWT itself is verified.
//!
//! ## Delegation
//!
//! When two tokens are supplied, the second is an authority (AAA service)
//! token with `authentication_delegator`, and its key verifies the signature
//! on behalf of the first, which needs fleet management rights.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use tracing::{debug, error, warn};

use crate::ed25519::{self, Ed25519KeyPair};
use crate::errors::{SecurityError, TokenError};
use crate::provider::{RequestSigner, SecurityProvider, SecurityTechnology};
use crate::tokens::{self, ClientIdClaims, Purpose, ServerClaims, SignerKey};

/// Configuration for [`ChoriaSecurity`].
#[derive(Clone, Default)]
pub struct ChoriaSecurityConfig {
    /// Identity of this process
    pub identity: String,
    /// File holding the hex encoded ed25519 seed
    pub seed_file: PathBuf,
    /// File holding this identity's JWT
    pub token_file: PathBuf,
    /// Keys trusted to issue client and server tokens
    pub trusted_token_signers: Vec<VerifyingKey>,
    /// Optional remote signing authority
    pub remote_signer: Option<Arc<dyn RequestSigner>>,
}

impl std::fmt::Debug for ChoriaSecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoriaSecurityConfig")
            .field("identity", &self.identity)
            .field("seed_file", &self.seed_file)
            .field("token_file", &self.token_file)
            .field("trusted_token_signers", &self.trusted_token_signers.len())
            .field("remote_signer", &self.remote_signer.as_ref().map(|s| s.kind().to_string()))
            .finish()
    }
}

impl ChoriaSecurityConfig {
    /// Report every configuration problem at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.identity.is_empty() {
            errors.push("identity is required".to_string());
        }
        if self.seed_file.as_os_str().is_empty() {
            errors.push("seed file is required".to_string());
        }
        if self.token_file.as_os_str().is_empty() {
            errors.push("token file is required".to_string());
        }
        if self.trusted_token_signers.is_empty() {
            errors.push("no trusted token signers configured".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Ed25519 + JWT security provider.
pub struct ChoriaSecurity {
    config: ChoriaSecurityConfig,
    keypair: Ed25519KeyPair,
}

impl ChoriaSecurity {
    /// Validate the configuration and load the seed.
    pub fn new(config: ChoriaSecurityConfig) -> Result<Self, SecurityError> {
        config.validate().map_err(SecurityError::Config)?;
        let keypair = Ed25519KeyPair::from_seed_file(&config.seed_file)?;

        Ok(Self { config, keypair })
    }

    /// Public key of the loaded seed, hex encoded.
    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    fn token(&self) -> Result<String, SecurityError> {
        std::fs::read_to_string(&self.config.token_file)
            .map(|t| t.trim().to_string())
            .map_err(|source| SecurityError::Io {
                path: self.config.token_file.clone(),
                source,
            })
    }

    fn with_signers<T>(
        &self,
        parse: impl Fn(&SignerKey) -> Result<T, TokenError>,
    ) -> Result<T, TokenError> {
        let mut last = TokenError::InvalidKey("no trusted token signers configured".into());

        for signer in &self.config.trusted_token_signers {
            match parse(&SignerKey::Ed25519(*signer)) {
                Ok(claims) => return Ok(claims),
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => last = err,
            }
        }

        Err(last)
    }

    fn parse_client_token(&self, token: &str) -> Result<ClientIdClaims, TokenError> {
        self.with_signers(|k| tokens::parse_client_id_token(token, k, true))
    }

    fn parse_server_token(&self, token: &str) -> Result<ServerClaims, TokenError> {
        self.with_signers(|k| tokens::parse_server_token(token, k))
    }

    fn public_key_from_token(&self, token: &[u8]) -> Result<(VerifyingKey, String), SecurityError> {
        let token = std::str::from_utf8(token).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;

        match tokens::token_purpose(token) {
            Purpose::Server => {
                let claims = self.parse_server_token(token)?;
                let key = ed25519::verifying_key_from_hex(&claims.standard.public_key)?;
                Ok((key, claims.identity))
            }
            Purpose::ClientId => {
                let claims = self.parse_client_token(token)?;
                let perms = claims.perms();

                if perms.signed_fleet_management {
                    return Err(SecurityError::CallerNotAllowed {
                        caller: claims.callerid,
                        reason: "requires authority delegation".into(),
                    });
                }
                if !perms.fleet_management {
                    return Err(SecurityError::CallerNotAllowed {
                        caller: claims.callerid,
                        reason: "does not have fleet management access".into(),
                    });
                }

                let key = ed25519::verifying_key_from_hex(&claims.standard.public_key)?;
                Ok((key, claims.callerid))
            }
            purpose => Err(SecurityError::InvalidKey(format!(
                "cannot verify signatures using a '{}' purpose token",
                purpose
            ))),
        }
    }

    fn public_key_from_delegated_tokens(
        &self,
        caller: &[u8],
        delegate: &[u8],
    ) -> Result<(VerifyingKey, String), SecurityError> {
        let caller = std::str::from_utf8(caller).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
        let delegate = std::str::from_utf8(delegate).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;

        let delegate_claims = self.parse_client_token(delegate)?;
        if !delegate_claims.is_delegator() {
            return Err(SecurityError::CallerNotAllowed {
                caller: delegate_claims.callerid,
                reason: "does not have authentication delegation".into(),
            });
        }

        let caller_claims = self.parse_client_token(caller)?;
        if !caller_claims.has_fleet_access() {
            return Err(SecurityError::CallerNotAllowed {
                caller: caller_claims.callerid,
                reason: "does not have fleet management access".into(),
            });
        }

        let key = ed25519::verifying_key_from_hex(&delegate_claims.standard.public_key)?;

        Ok((key, delegate_claims.callerid))
    }
}

#[async_trait]
impl SecurityProvider for ChoriaSecurity {
    fn provider(&self) -> &str {
        "choria"
    }

    fn backing_technology(&self) -> SecurityTechnology {
        SecurityTechnology::Ed25519Jwt
    }

    fn identity(&self) -> &str {
        &self.config.identity
    }

    fn caller_name(&self) -> String {
        self.token()
            .ok()
            .and_then(|t| tokens::parse_unverified::<ClientIdClaims>(&t).ok())
            .filter(|c| c.standard.purpose == Purpose::ClientId && !c.callerid.is_empty())
            .map(|c| c.callerid)
            .unwrap_or_else(|| format!("choria={}", self.config.identity))
    }

    fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        Ok(self.keypair.sign(data))
    }

    fn verify_signature_bytes(&self, data: &[u8], signature: &[u8], public: &[&[u8]]) -> (bool, String) {
        let resolved = match public {
            [] => {
                error!("Could not verify signature, no public keys given");
                return (false, String::new());
            }
            [caller, delegate] => self.public_key_from_delegated_tokens(caller, delegate),
            [token, ..] => self.public_key_from_token(token),
        };

        let (key, name) = match resolved {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "Could not resolve public key for signature verification");
                return (false, String::new());
            }
        };

        match ed25519::verify(key.as_bytes(), data, signature) {
            Ok(true) => (true, name),
            Ok(false) => {
                debug!(signer = %name, "Signature did not verify");
                (false, String::new())
            }
            Err(err) => {
                warn!(error = %err, "Signature verification failed");
                (false, String::new())
            }
        }
    }

    fn token_bytes(&self) -> Result<Vec<u8>, SecurityError> {
        self.token().map(String::into_bytes)
    }

    fn should_allow_caller(&self, caller: &str, public: &[&[u8]]) -> Result<bool, SecurityError> {
        let (token, delegated) = match public {
            [] => return Err(SecurityError::NoPublicData),
            [token] => (*token, false),
            [token, _, ..] => (*token, true),
        };

        let token = std::str::from_utf8(token).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;

        match tokens::token_purpose(token) {
            Purpose::ClientId => {
                let claims = self.parse_client_token(token)?;
                if claims.callerid != caller {
                    return Err(SecurityError::CallerNotAllowed {
                        caller: caller.to_string(),
                        reason: format!("token is for caller {}", claims.callerid),
                    });
                }
            }
            Purpose::Server => {
                let claims = self.parse_server_token(token)?;
                let identity = self.caller_identity(caller)?;
                if claims.identity != identity {
                    return Err(SecurityError::CallerNotAllowed {
                        caller: caller.to_string(),
                        reason: format!("token is for server {}", claims.identity),
                    });
                }
            }
            purpose => {
                return Err(SecurityError::CallerNotAllowed {
                    caller: caller.to_string(),
                    reason: format!("unsupported token purpose '{}'", purpose),
                })
            }
        }

        Ok(delegated)
    }

    async fn remote_sign_request(&self, request: &[u8]) -> Result<Vec<u8>, SecurityError> {
        match &self.config.remote_signer {
            Some(signer) => {
                debug!(signer = signer.kind(), "Requesting remote signature");
                signer.sign(request).await
            }
            None => Err(SecurityError::RemoteSigningNotConfigured),
        }
    }

    fn is_remote_signing(&self) -> bool {
        self.config.remote_signer.is_some()
    }

    fn is_signing_authority(&self) -> bool {
        self.token()
            .ok()
            .and_then(|t| tokens::parse_unverified::<ClientIdClaims>(&t).ok())
            .is_some_and(|c| c.standard.purpose == Purpose::ClientId && c.is_delegator())
    }
}
