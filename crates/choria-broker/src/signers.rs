//! # JWT Signer Resolution
//!
//! Connection tokens are trusted when a configured signer issued them.
//!
//! - With organization issuers configured, the unverified `ou` claim picks
//!   the single issuer that must have signed the token.
//! - Otherwise every signer is tried in turn. A signer of 64 characters is
//!   a hex Ed25519 public key, anything else is the path of a PEM file.
//!
//! Decoded Ed25519 keys are cached.

use std::collections::{BTreeMap, HashMap};

use choria_security::tokens::{self, ClientIdClaims, ServerClaims, SignerKey};
use choria_security::TokenError;
use parking_lot::Mutex;
use serde_json::Value;

use crate::errors::AuthError;

/// Trusted token signers and organization issuers.
#[derive(Debug, Default)]
pub struct Signers {
    client: Vec<String>,
    server: Vec<String>,
    issuers: BTreeMap<String, String>,
    cache: Mutex<HashMap<String, SignerKey>>,
}

impl Signers {
    /// Signers for client and server tokens plus organization issuers.
    pub fn new(client: Vec<String>, server: Vec<String>, issuers: BTreeMap<String, String>) -> Self {
        Self {
            client,
            server,
            issuers,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether organization issuers are configured.
    pub fn has_issuers(&self) -> bool {
        !self.issuers.is_empty()
    }

    fn cached_ed25519(&self, key: &str) -> Result<SignerKey, TokenError> {
        let mut cache = self.cache.lock();

        if let Some(found) = cache.get(key) {
            return Ok(found.clone());
        }

        let parsed = SignerKey::from_hex(key)?;
        cache.insert(key.to_string(), parsed.clone());

        Ok(parsed)
    }

    /// Try every signer, stopping early on errors no other signer can fix.
    fn parse_with_signers<T>(
        &self,
        signers: &[String],
        kind: &'static str,
        parse: impl Fn(&SignerKey) -> Result<T, TokenError>,
    ) -> Result<T, AuthError> {
        for signer in signers {
            let result = if signer.len() == 64 {
                match self.cached_ed25519(signer) {
                    Ok(key) => parse(&key),
                    Err(_) => continue,
                }
            } else {
                SignerKey::from_pem_file(signer).and_then(|key| parse(&key))
            };

            match result {
                Ok(claims) => return Ok(claims),
                Err(e) if signers.len() == 1 || e.is_terminal() => return Err(e.into()),
                Err(_) => continue,
            }
        }

        Err(AuthError::NoMatchingSigner {
            kind,
            count: signers.len(),
        })
    }

    /// Verify with the issuer named by the token's `ou` claim.
    fn parse_with_issuer<T>(
        &self,
        token: &str,
        parse: impl Fn(&SignerKey) -> Result<T, TokenError>,
    ) -> Result<T, AuthError> {
        let claims: Value = tokens::parse_unverified(token)?;

        let ou = match claims.get("ou") {
            None | Some(Value::Null) => return Err(AuthError::Denied("no ou claim in token")),
            Some(Value::String(ou)) => ou.clone(),
            Some(_) => return Err(AuthError::Denied("invalid ou in token")),
        };

        let issuer = self
            .issuers
            .get(&ou)
            .ok_or_else(|| AuthError::UnknownIssuer(ou.clone()))?;

        let key = self
            .cached_ed25519(issuer)
            .map_err(|e| AuthError::InvalidIssuer(e.to_string()))?;

        parse(&key).map_err(|source| AuthError::IssuerChain { ou, source })
    }

    /// Verify a server token and require an identity and public key.
    pub fn parse_server_jwt(&self, token: &str) -> Result<ServerClaims, AuthError> {
        if self.server.is_empty() && self.issuers.is_empty() {
            return Err(AuthError::Denied(
                "no Server JWT signer or Organization Issuer set, denying all servers",
            ));
        }

        if token.is_empty() {
            return Err(AuthError::Denied("no JWT received"));
        }

        let claims = if self.has_issuers() {
            self.parse_with_issuer(token, |key| tokens::parse_server_token(token, key))?
        } else {
            self.parse_with_signers(&self.server, "server", |key| tokens::parse_server_token(token, key))?
        };

        if claims.identity.is_empty() {
            return Err(AuthError::Denied("identity not in claims"));
        }

        if claims.standard.public_key.is_empty() {
            return Err(AuthError::Denied("no public key in claims"));
        }

        Ok(claims)
    }

    /// Verify a client id token and require a caller id and public key.
    pub fn parse_client_id_jwt(&self, token: &str) -> Result<ClientIdClaims, AuthError> {
        if self.client.is_empty() && self.issuers.is_empty() {
            return Err(AuthError::Denied(
                "no Client JWT signer or Organization Issuer set, denying all clients",
            ));
        }

        if token.is_empty() {
            return Err(AuthError::Denied("no JWT received"));
        }

        let claims = if self.has_issuers() {
            self.parse_with_issuer(token, |key| tokens::parse_client_id_token(token, key, true))?
        } else {
            self.parse_with_signers(&self.client, "client", |key| {
                tokens::parse_client_id_token(token, key, true)
            })?
        };

        if claims.callerid.is_empty() {
            return Err(AuthError::Denied("no callerid in claims"));
        }

        if claims.standard.public_key.is_empty() {
            return Err(AuthError::Denied("no public key in claims"));
        }

        Ok(claims)
    }

    /// Verify a client id token strictly against the organization issuers.
    pub fn parse_client_id_jwt_with_issuer(&self, token: &str) -> Result<ClientIdClaims, AuthError> {
        self.parse_with_issuer(token, |key| tokens::parse_client_id_token(token, key, true))
    }
}
