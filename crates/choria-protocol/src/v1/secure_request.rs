use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use choria_security::SecurityProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ProtocolConfig;
use crate::errors::ProtocolError;
use crate::schema;
use crate::version::ProtocolVersion;

use super::{require_x509, Request, TransportMessage};

const INSECURE: &str = "insecure";
const INSECURE_REGISTRATION: &str = "insecure registration";

/// Version 1 signed request.
///
/// The signature is made over the exact bytes of `message`, which is the
/// JSON of the inner [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureRequest {
    protocol: ProtocolVersion,
    message: String,
    signature: String,
    pubcert: String,
}

impl SecureRequest {
    /// Sign `request` with the local certificate.
    ///
    /// Signing is skipped for requests to unsigned agents and when security
    /// is disabled. Registration agents fall back to an unsigned request when
    /// the certificate or key is unavailable.
    pub fn new(
        request: &Request,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<Self, ProtocolError> {
        require_x509(security)?;

        let mut pubcert = INSECURE.to_string();

        if config.secure && !config.is_unsigned_agent(request.agent()) {
            match security.token_bytes() {
                Ok(cert) => pubcert = String::from_utf8_lossy(&cert).into_owned(),
                Err(err) if config.is_registration_agent(request.agent()) => {
                    debug!(error = %err, "Certificate unavailable, sending unsigned registration");
                    pubcert = INSECURE_REGISTRATION.to_string();
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut secure = Self {
            protocol: ProtocolVersion::SecureRequestV1,
            message: String::new(),
            signature: String::new(),
            pubcert,
        };

        secure.set_message(request, security, config)?;

        Ok(secure)
    }

    /// Have the configured remote signer produce the secure request.
    ///
    /// Falls back to local signing when security is off or this process is
    /// itself a signing authority.
    pub async fn new_remote_signed(
        request: &Request,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
    ) -> Result<Self, ProtocolError> {
        if !config.secure || security.is_signing_authority() {
            return Self::new(request, security, config);
        }

        let j = request.json()?;

        let signed = tokio::time::timeout(config.remote_sign_timeout, security.remote_sign_request(&j))
            .await
            .map_err(|_| ProtocolError::RemoteSignTimeout(config.remote_sign_timeout))??;

        Self::from_json(&signed)
    }

    /// Parse the secure request carried in `transport`, checking its
    /// signature unless `skip_validation` is set.
    pub fn from_transport(
        transport: &TransportMessage,
        security: &dyn SecurityProvider,
        config: &ProtocolConfig,
        skip_validation: bool,
    ) -> Result<Self, ProtocolError> {
        let secure = Self::from_json(transport.message())?;

        if !skip_validation && !secure.valid(security, config) {
            return Err(ProtocolError::ValidationFailed(
                "SecureRequest message created from the Transport Message did not pass security validation",
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

        self.signature = INSECURE.to_string();

        if config.secure && !config.is_unsigned_agent(request.agent()) {
            let signature = match security.sign_bytes(&j) {
                Ok(signature) => signature,
                Err(err) if config.is_registration_agent(request.agent()) => {
                    debug!(error = %err, "Could not sign registration message");
                    INSECURE_REGISTRATION.as_bytes().to_vec()
                }
                Err(err) => return Err(err.into()),
            };

            self.signature = STANDARD.encode(signature);
        }

        self.message = String::from_utf8_lossy(&j).into_owned();

        Ok(())
    }

    /// Whether the signature verifies against the embedded certificate and
    /// that certificate may act as the request's caller.
    pub fn valid(&self, security: &dyn SecurityProvider, config: &ProtocolConfig) -> bool {
        if !config.secure {
            debug!("Bypassing validation on secure request, security is disabled");
            return true;
        }

        let request = match Request::from_secure_request(self) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "Could not create Request to validate Secure Request with");
                return false;
            }
        };

        let certname = match security.caller_identity(request.caller_id()) {
            Ok(certname) => certname,
            Err(err) => {
                error!(error = %err, "Could not extract certname from caller");
                return false;
            }
        };

        if let Err(err) = security.should_allow_caller(&certname, &[self.pubcert.as_bytes()]) {
            error!(caller = %request.caller_id(), error = %err, "Client Certificate verification failed");
            return false;
        }

        let signature = match STANDARD.decode(&self.signature) {
            Ok(signature) if !signature.is_empty() => signature,
            Ok(_) => {
                error!("Secure request has an empty signature");
                return false;
            }
            Err(err) => {
                error!(error = %err, "Could not base64 decode signature");
                return false;
            }
        };

        let (ok, _) = security.verify_signature_bytes(self.message.as_bytes(), &signature, &[self.pubcert.as_bytes()]);
        if !ok {
            error!("Signature in request did not pass validation with embedded public certificate");
            return false;
        }

        true
    }

    /// Signed message body.
    pub fn message(&self) -> &[u8] {
        self.message.as_bytes()
    }

    /// Embedded PEM certificate.
    pub fn public_certificate(&self) -> &str {
        &self.pubcert
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

    /// Validate a document against the version 1 secure request schema.
    pub fn is_valid_json(data: &[u8]) -> Result<(), ProtocolError> {
        schema::validate(ProtocolVersion::SecureRequestV1, data)
    }
}
