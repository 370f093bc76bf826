use choria_security::SecurityProvider;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use tracing::{debug, error};

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::schema;
use crate::version::ProtocolVersion;

use super::{require_ed25519, Request, TransportMessage};

const INSECURE: &[u8] = b"insecure";

/// Version 2 signed request.
///
/// `caller` holds the caller's JWT. When an authority signed the request on
/// the caller's behalf `signer` holds the authority's JWT and the signature
/// is the authority's.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureRequest {
    protocol: ProtocolVersion,
    #[serde_as(as = "Base64")]
    request: Vec<u8>,
    #[serde_as(as = "Base64")]
    signature: Vec<u8>,
    caller: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    signer: String,
}

impl SecureRequest {
    /// Sign `request` with the local identity, attaching its JWT.
    pub fn new(
        request: &Request,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<Self, ProtocolError> {
        require_ed25519(security)?;

        let mut secure = Self {
            protocol: ProtocolVersion::SecureRequestV2,
            request: Vec::new(),
            signature: Vec::new(),
            caller: String::new(),
            signer: String::new(),
        };

        if config.secure {
            let token = security.token_bytes()?;
            secure.caller = String::from_utf8_lossy(&token).into_owned();
        }

        secure.set_message(request, security, config)?;

        Ok(secure)
    }

    /// Have the configured remote signer produce the secure request.
    ///
    /// A signing authority signs its own requests locally, as does every
    /// process when security is off. A remotely signed request without a
    /// signer JWT is refused.
    pub async fn new_remote_signed(
        request: &Request,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<Self, ProtocolError> {
        require_ed25519(security)?;

        if !config.secure || security.is_signing_authority() {
            return Self::new(request, security, config);
        }

        let j = request.json()?;

        let signed = tokio::time::timeout(config.remote_sign_timeout, security.remote_sign_request(&j))
            .await
            .map_err(|_| ProtocolError::RemoteSignTimeout(config.remote_sign_timeout))??;

        let secure = Self::from_json(&signed)?;

        if secure.signer.is_empty() {
            return Err(ProtocolError::MissingSignerJwt);
        }

        Ok(secure)
    }

    /// Parse the secure request carried in `transport`, checking signature
    /// and caller unless `skip_validation` is set.
    pub fn from_transport(
        transport: &TransportMessage,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
        skip_validation: bool,
    ) -> Result<Self, ProtocolError> {
        require_ed25519(security)?;

        let secure = Self::from_json(transport.message())?;

        if !skip_validation && !secure.valid(security, config) {
            return Err(ProtocolError::ValidationFailed(
                "secure request messages created from Transport Message did not pass security validation",
            ));
        }

        Ok(secure)
    }

    /// Parse and schema validate a secure request document.
    pub fn from_json(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::is_valid_json(data)?;
        Ok(serde_json::from_slice(data)?)
    }

    /// Store `request` as the message and sign it.
    pub fn set_message(
        &mut self,
        request: &Request,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<(), ProtocolError> {
        let j = request
            .json()
            .map_err(|e| ProtocolError::encode("reply message to store it in the Secure Request", e))?;

        self.signature = if config.secure {
            security.sign_bytes(&j)?
        } else {
            INSECURE.to_vec()
        };

        self.request = j;

        Ok(())
    }

    /// Whether the signature verifies against the caller or signer JWT and
    /// the caller is entitled to make the request.
    pub fn valid(&self, security: &dyn SecurityProvider, config: &ProtocolConfig) -> bool {
        if !config.secure {
            debug!("Bypassing validation on secure request, security is disabled");
            return true;
        }

        if self.signature.is_empty() {
            error!("Secure request has an empty signature");
            return false;
        }

        let mut public = vec![self.caller.as_bytes()];
        if !self.signer.is_empty() {
            public.push(self.signer.as_bytes());
        }

        let (ok, signer) = security.verify_signature_bytes(&self.request, &self.signature, &public);
        if !ok {
            error!("Signature in request did not pass validation");
            return false;
        }

        let request = match Request::from_secure_request(self) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "Could not create Request to validate Secure Request with");
                return false;
            }
        };

        match security.should_allow_caller(request.caller_id(), &public) {
            Ok(delegated) => {
                debug!(caller = %request.caller_id(), signer = %signer, delegated, "Allowing caller");
                true
            }
            Err(err) => {
                error!(caller = %request.caller_id(), error = %err, "Caller is not allowed");
                false
            }
        }
    }

    /// Signed request body.
    pub fn message(&self) -> &[u8] {
        &self.request
    }

    /// Signature over the request body.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Caller JWT.
    pub fn caller_jwt(&self) -> &str {
        &self.caller
    }

    /// Delegated signer JWT, empty when signed by the caller.
    pub fn signer_jwt(&self) -> &str {
        &self.signer
    }

    /// Record the JWT of the authority that signed on the caller's behalf.
    pub fn set_signer(&mut self, signer: &[u8]) {
        self.signer = String::from_utf8_lossy(signer).into_owned();
    }

    /// Protocol version.
    pub fn version(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Schema validated JSON.
    pub fn json(&self) -> Result<Vec<u8>, ProtocolError> {
        let j = serde_json::to_vec(self)?;
        Self::is_valid_json(&j)?;
        Ok(j)
    }

    /// Validate a document against the version 2 secure request schema.
    pub fn is_valid_json(data: &[u8]) -> Result<(), ProtocolError> {
        schema::validate(ProtocolVersion::SecureRequestV2, data)
    }
}
