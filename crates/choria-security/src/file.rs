//! # X.509 File Security
//!
//! Protocol v1 provider backed by PEM files on disk: an RSA private key, the
//! matching certificate, and a CA bundle. Signatures are RSA PKCS#1 v1.5 over
//! SHA-256 and the signer's certificate travels with every request.
//!
//! Callers are allowed when their certificate is issued by the CA and names
//! them, or when the certificate matches a privileged user pattern.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::{debug, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;

use crate::errors::SecurityError;
use crate::provider::{RequestSigner, SecurityProvider, SecurityTechnology};

/// Configuration for [`FileSecurity`].
#[derive(Clone)]
pub struct FileSecurityConfig {
    /// Identity of this process, the certificate name
    pub identity: String,
    /// PEM certificate of this identity
    pub certificate: PathBuf,
    /// PEM RSA private key, PKCS#1 or PKCS#8
    pub key: PathBuf,
    /// PEM CA bundle
    pub ca: PathBuf,
    /// Certificate names that may act as any caller
    pub privileged_users: Vec<String>,
    /// Certificate names allowed to make requests
    pub allow_list: Vec<String>,
    /// Optional remote signing authority
    pub remote_signer: Option<Arc<dyn RequestSigner>>,
}

impl Default for FileSecurityConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            certificate: PathBuf::new(),
            key: PathBuf::new(),
            ca: PathBuf::new(),
            privileged_users: vec![r"\.privileged.mcollective$".into(), r"\.privileged.choria$".into()],
            allow_list: vec![r"\.mcollective$".into(), r"\.choria$".into()],
            remote_signer: None,
        }
    }
}

impl std::fmt::Debug for FileSecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSecurityConfig")
            .field("identity", &self.identity)
            .field("certificate", &self.certificate)
            .field("key", &self.key)
            .field("ca", &self.ca)
            .field("privileged_users", &self.privileged_users)
            .field("allow_list", &self.allow_list)
            .field("remote_signer", &self.remote_signer.as_ref().map(|s| s.kind().to_string()))
            .finish()
    }
}

impl FileSecurityConfig {
    /// Report every configuration problem at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.identity.is_empty() {
            errors.push("identity is required".to_string());
        }

        for (name, path) in [("certificate", &self.certificate), ("key", &self.key), ("ca", &self.ca)] {
            if path.as_os_str().is_empty() {
                errors.push(format!("{} is required", name));
            } else if !path.exists() {
                errors.push(format!("{} {} does not exist", name, path.display()));
            }
        }

        for pattern in self.privileged_users.iter().chain(&self.allow_list) {
            if let Err(err) = Regex::new(pattern) {
                errors.push(format!("invalid pattern {}: {}", pattern, err));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// X.509 / RSA security provider.
pub struct FileSecurity {
    config: FileSecurityConfig,
    privileged: Vec<Regex>,
    allowed: Vec<Regex>,
}

fn read(path: &Path) -> Result<Vec<u8>, SecurityError> {
    std::fs::read(path).map_err(|source| SecurityError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, SecurityError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| SecurityError::Config(vec![e.to_string()])))
        .collect()
}

/// DER blocks of every certificate in a PEM document.
fn certificate_blocks(data: &[u8]) -> Result<Vec<pem::Pem>, SecurityError> {
    let blocks: Vec<pem::Pem> = pem::parse_many(data)
        .map_err(|e| SecurityError::InvalidCertificate(e.to_string()))?
        .into_iter()
        .filter(|b| b.tag() == "CERTIFICATE")
        .collect();

    if blocks.is_empty() {
        return Err(SecurityError::InvalidCertificate("no certificates found in PEM data".into()));
    }

    Ok(blocks)
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, SecurityError> {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, cert)| cert)
        .map_err(|e| SecurityError::InvalidCertificate(e.to_string()))
}

/// Common name and DNS subject alternative names.
fn certificate_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut names: Vec<String> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok().map(str::to_string))
        .collect();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_string());
            }
        }
    }

    names
}

impl FileSecurity {
    /// Validate the configuration and compile the name patterns.
    pub fn new(config: FileSecurityConfig) -> Result<Self, SecurityError> {
        config.validate().map_err(SecurityError::Config)?;

        Ok(Self {
            privileged: compile(&config.privileged_users)?,
            allowed: compile(&config.allow_list)?,
            config,
        })
    }

    fn private_key(&self) -> Result<RsaPrivateKey, SecurityError> {
        let data = read(&self.config.key)?;
        let pem = std::str::from_utf8(&data).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;

        RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| SecurityError::InvalidKey(e.to_string()))
    }

    fn public_key(certificate: &[u8]) -> Result<(RsaPublicKey, String), SecurityError> {
        let blocks = certificate_blocks(certificate)?;
        let cert = parse_certificate(blocks[0].contents())?;

        let key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
        let name = certificate_names(&cert).into_iter().next().unwrap_or_default();

        Ok((key, name))
    }

    /// Verify a PEM certificate against the CA bundle.
    ///
    /// The certificate must be signed by a CA in the bundle and be inside its
    /// validity window. When `name` is not empty it must match the common
    /// name or a DNS subject alternative name. Returns the certificate names.
    pub fn verify_certificate(&self, certificate: &[u8], name: &str) -> Result<Vec<String>, SecurityError> {
        let blocks = certificate_blocks(certificate)?;
        let leaf = parse_certificate(blocks[0].contents())?;

        let ca_data = read(&self.config.ca)?;
        let cas = certificate_blocks(&ca_data)?;

        let trusted = cas.iter().any(|block| match parse_certificate(block.contents()) {
            Ok(ca) => leaf.verify_signature(Some(ca.public_key())).is_ok(),
            Err(_) => false,
        });

        if !trusted {
            return Err(SecurityError::CertificateVerification("certificate is not signed by a trusted CA".into()));
        }

        if !leaf.validity().is_valid() {
            return Err(SecurityError::CertificateVerification("certificate is expired or not yet valid".into()));
        }

        let names = certificate_names(&leaf);

        if !name.is_empty() && !names.iter().any(|n| n == name) {
            return Err(SecurityError::CertificateVerification(format!(
                "certificate does not match name {}",
                name
            )));
        }

        Ok(names)
    }

    fn is_privileged(&self, names: &[String]) -> bool {
        names.iter().any(|n| self.privileged.iter().any(|p| p.is_match(n)))
    }

    fn is_allowed(&self, names: &[String]) -> bool {
        self.allowed.is_empty() || names.iter().any(|n| self.allowed.iter().any(|p| p.is_match(n)))
    }
}

#[async_trait]
impl SecurityProvider for FileSecurity {
    fn provider(&self) -> &str {
        "file"
    }

    fn backing_technology(&self) -> SecurityTechnology {
        SecurityTechnology::X509
    }

    fn identity(&self) -> &str {
        &self.config.identity
    }

    fn caller_name(&self) -> String {
        format!("choria={}", self.config.identity)
    }

    fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let key = self.private_key()?;
        let signer = SigningKey::<Sha256>::new(key);

        signer
            .try_sign(data)
            .map(|sig| sig.to_vec())
            .map_err(|e| SecurityError::SigningFailed(e.to_string()))
    }

    fn verify_signature_bytes(&self, data: &[u8], signature: &[u8], public: &[&[u8]]) -> (bool, String) {
        let own;
        let certificate = match public.first() {
            Some(cert) => *cert,
            None => match read(&self.config.certificate) {
                Ok(data) => {
                    own = data;
                    own.as_slice()
                }
                Err(err) => {
                    warn!(error = %err, "Could not read own certificate for verification");
                    return (false, String::new());
                }
            },
        };

        let (key, name) = match Self::public_key(certificate) {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "Could not load public key from certificate");
                return (false, String::new());
            }
        };

        let Ok(sig) = Signature::try_from(signature) else {
            debug!("Malformed RSA signature");
            return (false, String::new());
        };

        match VerifyingKey::<Sha256>::new(key).verify(data, &sig) {
            Ok(()) => (true, name),
            Err(_) => (false, String::new()),
        }
    }

    fn token_bytes(&self) -> Result<Vec<u8>, SecurityError> {
        read(&self.config.certificate)
    }

    fn should_allow_caller(&self, caller: &str, public: &[&[u8]]) -> Result<bool, SecurityError> {
        let [certificate] = public else {
            return Err(SecurityError::NoPublicData);
        };

        match self.verify_certificate(certificate, caller) {
            Ok(names) if self.is_allowed(&names) => return Ok(false),
            Ok(_) => {
                return Err(SecurityError::CallerNotAllowed {
                    caller: caller.to_string(),
                    reason: "certificate name is not on the allow list".into(),
                })
            }
            Err(err) => debug!(caller, error = %err, "Certificate does not name the caller, checking privileged users"),
        }

        let names = self.verify_certificate(certificate, "")?;

        if self.is_privileged(&names) {
            debug!(caller, names = ?names, "Allowing privileged certificate");
            return Ok(true);
        }

        Err(SecurityError::CallerNotAllowed {
            caller: caller.to_string(),
            reason: "certificate does not match the caller and is not privileged".into(),
        })
    }

    async fn remote_sign_request(&self, request: &[u8]) -> Result<Vec<u8>, SecurityError> {
        match &self.config.remote_signer {
            Some(signer) => signer.sign(request).await,
            None => Err(SecurityError::RemoteSigningNotConfigured),
        }
    }

    fn is_remote_signing(&self) -> bool {
        self.config.remote_signer.is_some()
    }
}
