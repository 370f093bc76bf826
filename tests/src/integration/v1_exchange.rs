//! # Version 1 Exchange
//!
//! Certificate based providers sharing one CA. The request carries the
//! client certificate, the server checks it against the CA and the caller
//! before checking the RSA signature.

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, LazyLock};

    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, PKCS_RSA_SHA256};
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPrivateKey;
    use tempfile::TempDir;

    use choria_protocol::{EnvelopeService, ProtocolConfig, ProtocolVersion};
    use choria_security::{FileSecurity, FileSecurityConfig, SecurityProvider};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const REQUEST_ID: &str = "a2f0ca717c694f2086cfa81b6c494648";

    // RSA key generation is slow, share the keys between tests
    static KEYS: LazyLock<Vec<String>> = LazyLock::new(|| {
        (0..4)
            .map(|_| {
                let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
                key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
            })
            .collect()
    });

    struct Pki {
        dir: TempDir,
        ca: rcgen::Certificate,
        ca_key: KeyPair,
    }

    impl Pki {
        fn new() -> Self {
            Self::with_ca("Fleet CA", 0)
        }

        /// A CA named `name` using shared key `key_index`.
        fn with_ca(name: &str, key_index: usize) -> Self {
            let ca_key = KeyPair::from_pem_and_sign_algo(&KEYS[key_index], &PKCS_RSA_SHA256).unwrap();
            let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
            params.distinguished_name.push(DnType::CommonName, name);
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            let ca = params.self_signed(&ca_key).unwrap();

            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("ca.pem"), ca.pem()).unwrap();

            Self { dir, ca, ca_key }
        }

        fn security(&self, name: &str, key_index: usize) -> Arc<FileSecurity> {
            let key = KeyPair::from_pem_and_sign_algo(&KEYS[key_index], &PKCS_RSA_SHA256).unwrap();
            let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
            params.distinguished_name.push(DnType::CommonName, name);
            let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();

            let cert_path = self.path(&format!("{}.pem", name));
            let key_path = self.path(&format!("{}.key", name));
            std::fs::write(&cert_path, cert.pem()).unwrap();
            std::fs::write(&key_path, &KEYS[key_index]).unwrap();

            Arc::new(
                FileSecurity::new(FileSecurityConfig {
                    identity: name.into(),
                    certificate: cert_path,
                    key: key_path,
                    ca: self.path("ca.pem"),
                    ..Default::default()
                })
                .unwrap(),
            )
        }

        fn path(&self, file: &str) -> PathBuf {
            self.dir.path().join(file)
        }
    }

    fn service(security: Arc<FileSecurity>) -> EnvelopeService {
        EnvelopeService::new(ProtocolConfig::default(), security)
    }

    fn request_wire(client: &EnvelopeService) -> Vec<u8> {
        let caller = client.security().caller_name();
        let mut request = client.new_request("rpcutil", "ginkgo.mcollective", &caller, 60, REQUEST_ID, "mcollective");
        request.set_message(b"ping");

        let secure = client.new_secure_request(&request).unwrap();
        let mut transport = client.new_transport_message("ginkgo.mcollective");
        transport.set_reply_to("mcollective.reply.ginkgo.1");
        transport.set_request_data(&secure).unwrap();

        transport.json(client.config()).unwrap()
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[test]
    fn test_request_reply_round_trip() {
        let pki = Pki::new();
        let client = service(pki.security("ginkgo.mcollective", 1));
        let server = service(pki.security("n1.mcollective", 2));

        let wire = request_wire(&client);
        let transport = server.new_transport_from_json(&wire).unwrap();
        assert_eq!(transport.version(), ProtocolVersion::TransportV1);

        let secure = server.new_secure_request_from_transport(&transport, false).unwrap();
        let request = server.new_request_from_secure_request(&secure).unwrap();
        assert_eq!(request.caller_id(), "choria=ginkgo.mcollective");
        assert_eq!(request.message(), b"ping");

        let mut reply = server.new_reply(&request).unwrap();
        reply.set_message(b"pong");

        let mut reply_transport = server.new_transport_message("n1.mcollective");
        reply_transport
            .set_reply_data(&server.new_secure_reply(&reply).unwrap())
            .unwrap();

        let received = client
            .new_transport_from_json(&reply_transport.json(server.config()).unwrap())
            .unwrap();
        let secure_reply = client.new_secure_reply_from_transport(&received, false).unwrap();
        let reply = client.new_reply_from_secure_reply(&secure_reply).unwrap();

        assert_eq!(reply.message(), b"pong");
        assert_eq!(reply.request_id(), REQUEST_ID);
    }

    #[test]
    fn test_certificate_from_other_ca_rejected() {
        let (ours, theirs) = (Pki::new(), Pki::with_ca("Rogue CA", 3));
        assert_ne!(ours.ca.pem(), theirs.ca.pem());

        let client = service(theirs.security("ginkgo.mcollective", 1));
        let server = service(ours.security("n1.mcollective", 2));

        let transport = server.new_transport_from_json(&request_wire(&client)).unwrap();
        assert!(server.new_secure_request_from_transport(&transport, false).is_err());
    }

    #[test]
    fn test_impostor_ca_with_same_name_rejected() {
        let (ours, theirs) = (Pki::new(), Pki::with_ca("Fleet CA", 3));
        let client = service(theirs.security("ginkgo.mcollective", 1));
        let server = service(ours.security("n1.mcollective", 2));

        let transport = server.new_transport_from_json(&request_wire(&client)).unwrap();
        assert!(server.new_secure_request_from_transport(&transport, false).is_err());
    }

    #[test]
    fn test_caller_outside_allow_list_rejected() {
        let pki = Pki::new();
        let client = service(pki.security("ginkgo.example.net", 1));
        let server = service(pki.security("n1.mcollective", 2));

        let transport = server.new_transport_from_json(&request_wire(&client)).unwrap();
        assert!(server.new_secure_request_from_transport(&transport, false).is_err());
    }

    #[test]
    fn test_privileged_certificate_may_act_as_anyone() {
        let pki = Pki::new();
        let admin = service(pki.security("admin.privileged.mcollective", 1));
        let server = service(pki.security("n1.mcollective", 2));

        let mut request = admin.new_request("rpcutil", "admin", "choria=bob.mcollective", 60, REQUEST_ID, "mcollective");
        request.set_message(b"ping");
        let mut transport = admin.new_transport_message("admin");
        transport
            .set_request_data(&admin.new_secure_request(&request).unwrap())
            .unwrap();

        let received = server
            .new_transport_from_json(&transport.json(admin.config()).unwrap())
            .unwrap();
        assert!(server.new_secure_request_from_transport(&received, false).is_ok());
    }
}
