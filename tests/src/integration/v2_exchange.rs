//! # Version 2 Exchange
//!
//! A client and a server, each with its own seed and token issued by the
//! same organization key, exchange a request and a reply through
//! transports serialized to the wire.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::Duration;
    use serde_json::Value;
    use tempfile::TempDir;

    use choria_protocol::{EnvelopeService, ProtocolConfig, ProtocolVersion, TransportMessage};
    use choria_security::tokens::{
        sign_token, ClientIdClaims, ClientPermissions, Purpose, ServerClaims, StandardClaims, TokenSigner,
    };
    use choria_security::{ChoriaSecurity, ChoriaSecurityConfig, Ed25519KeyPair, SecurityProvider};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const REQUEST_ID: &str = "a2f0ca717c694f2086cfa81b6c494648";

    struct Org {
        dir: TempDir,
        issuer: Ed25519KeyPair,
    }

    impl Org {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                issuer: Ed25519KeyPair::generate(),
            }
        }

        fn client_token(&self, caller: &str, holder: &Ed25519KeyPair, perms: ClientPermissions) -> String {
            let claims = ClientIdClaims {
                callerid: caller.into(),
                permissions: Some(perms),
                standard: StandardClaims {
                    public_key: holder.public_key_hex(),
                    ..StandardClaims::new("ginkgo", Purpose::ClientId, Duration::hours(1), false)
                },
                ..Default::default()
            };
            sign_token(&claims, TokenSigner::Ed25519(self.issuer.signing_key())).unwrap()
        }

        fn server_token(&self, identity: &str, holder: &Ed25519KeyPair) -> String {
            let claims = ServerClaims {
                identity: identity.into(),
                collectives: vec!["mcollective".into()],
                standard: StandardClaims {
                    public_key: holder.public_key_hex(),
                    ..StandardClaims::new("ginkgo", Purpose::Server, Duration::hours(1), false)
                },
                ..Default::default()
            };
            sign_token(&claims, TokenSigner::Ed25519(self.issuer.signing_key())).unwrap()
        }

        fn security(&self, identity: &str, token: impl Fn(&Ed25519KeyPair) -> String) -> Arc<ChoriaSecurity> {
            let holder = Ed25519KeyPair::generate();
            let seed = self.dir.path().join(format!("{}.seed", identity));
            let token_file = self.dir.path().join(format!("{}.jwt", identity));

            holder.save_seed_file(&seed).unwrap();
            std::fs::write(&token_file, token(&holder)).unwrap();

            Arc::new(
                ChoriaSecurity::new(ChoriaSecurityConfig {
                    identity: identity.into(),
                    seed_file: seed,
                    token_file,
                    trusted_token_signers: vec![self.issuer.verifying_key()],
                    remote_signer: None,
                })
                .unwrap(),
            )
        }

        fn client(&self, perms: ClientPermissions) -> EnvelopeService {
            let security = self.security("ginkgo.example.net", |h| self.client_token("up=ginkgo", h, perms.clone()));
            EnvelopeService::new(ProtocolConfig::default(), security)
        }

        fn server(&self) -> EnvelopeService {
            let security = self.security("n1.example.net", |h| self.server_token("n1.example.net", h));
            EnvelopeService::new(ProtocolConfig::default(), security)
        }
    }

    fn fleet() -> ClientPermissions {
        ClientPermissions {
            fleet_management: true,
            ..Default::default()
        }
    }

    fn request_wire(client: &EnvelopeService, caller: &str) -> Vec<u8> {
        let mut request = client.new_request("rpcutil", "ginkgo.example.net", caller, 60, REQUEST_ID, "mcollective");
        request.set_message(b"ping");

        let secure = client.new_secure_request(&request).unwrap();
        let mut transport = client.new_transport_message("ginkgo.example.net");
        transport.set_reply_to("mcollective.reply.ginkgo.1");
        transport.set_request_data(&secure).unwrap();

        transport.json(client.config()).unwrap()
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[test]
    fn test_request_reply_round_trip() {
        let org = Org::new();
        let client = org.client(fleet());
        let server = org.server();

        let wire = request_wire(&client, "up=ginkgo");
        let transport = server.new_transport_from_json(&wire).unwrap();
        assert_eq!(transport.version(), ProtocolVersion::TransportV2);

        let secure = server.new_secure_request_from_transport(&transport, false).unwrap();
        let request = server.new_request_from_secure_request(&secure).unwrap();
        assert_eq!(request.caller_id(), "up=ginkgo");
        assert_eq!(request.message(), b"ping");

        let mut reply = server.new_reply(&request).unwrap();
        reply.set_message(b"pong");
        let secure_reply = server.new_secure_reply(&reply).unwrap();

        let mut reply_transport = server.new_transport_message("n1.example.net");
        reply_transport.set_reply_data(&secure_reply).unwrap();
        let reply_wire = reply_transport.json(server.config()).unwrap();

        let received = client.new_transport_from_json(&reply_wire).unwrap();
        let secure_reply = client.new_secure_reply_from_transport(&received, false).unwrap();
        let reply = client.new_reply_from_secure_reply(&secure_reply).unwrap();

        assert_eq!(reply.message(), b"pong");
        assert_eq!(reply.request_id(), REQUEST_ID);
        assert_eq!(reply.sender_id(), "n1.example.net");
    }

    #[test]
    fn test_caller_must_match_token() {
        let org = Org::new();
        let client = org.client(fleet());
        let server = org.server();

        let wire = request_wire(&client, "up=mallory");
        let transport = server.new_transport_from_json(&wire).unwrap();

        assert!(server.new_secure_request_from_transport(&transport, false).is_err());
        assert!(server.new_secure_request_from_transport(&transport, true).is_ok());
    }

    #[test]
    fn test_fleet_management_required() {
        let org = Org::new();
        let client = org.client(ClientPermissions::default());
        let server = org.server();

        let wire = request_wire(&client, "up=ginkgo");
        let transport = server.new_transport_from_json(&wire).unwrap();

        assert!(server.new_secure_request_from_transport(&transport, false).is_err());
    }

    #[test]
    fn test_other_organization_rejected() {
        let (ours, theirs) = (Org::new(), Org::new());
        let client = ours.client(fleet());
        let server = theirs.server();

        let wire = request_wire(&client, "up=ginkgo");
        let transport = server.new_transport_from_json(&wire).unwrap();

        assert!(server.new_secure_request_from_transport(&transport, false).is_err());
    }

    #[test]
    fn test_tampered_request_rejected() {
        let org = Org::new();
        let client = org.client(fleet());
        let server = org.server();

        let wire = request_wire(&client, "up=ginkgo");
        let transport: Value = serde_json::from_slice(&wire).unwrap();
        let secure: Value =
            serde_json::from_slice(&STANDARD.decode(transport["data"].as_str().unwrap()).unwrap()).unwrap();
        let mut request: Value =
            serde_json::from_slice(&STANDARD.decode(secure["request"].as_str().unwrap()).unwrap()).unwrap();

        request["agent"] = "shell".into();

        let mut secure = secure;
        secure["request"] = STANDARD.encode(serde_json::to_vec(&request).unwrap()).into();
        let mut transport = transport;
        transport["data"] = STANDARD.encode(serde_json::to_vec(&secure).unwrap()).into();

        let received = server
            .new_transport_from_json(&serde_json::to_vec(&transport).unwrap())
            .unwrap();
        assert!(server.new_secure_request_from_transport(&received, false).is_err());
    }

    #[test]
    fn test_reply_from_unknown_server_rejected() {
        let org = Org::new();
        let other = Org::new();
        let client = org.client(fleet());
        let rogue = other.server();

        let wire = request_wire(&client, "up=ginkgo");
        let transport = rogue.new_transport_from_json(&wire).unwrap();
        let secure = rogue.new_secure_request_from_transport(&transport, true).unwrap();
        let request = rogue.new_request_from_secure_request(&secure).unwrap();

        let reply = rogue.new_reply(&request).unwrap();
        let mut reply_transport = rogue.new_transport_message("n1.example.net");
        reply_transport
            .set_reply_data(&rogue.new_secure_reply(&reply).unwrap())
            .unwrap();

        let received = TransportMessage::from_json(client.config(), &reply_transport.json(rogue.config()).unwrap()).unwrap();
        assert!(client.new_secure_reply_from_transport(&received, false).is_err());
    }

    #[test]
    fn test_insecure_mode_skips_signing() {
        let org = Org::new();
        let config = ProtocolConfig {
            secure: false,
            ..ProtocolConfig::default()
        };
        let security = org.security("ginkgo.example.net", |h| org.client_token("up=ginkgo", h, fleet()));
        let client = EnvelopeService::new(config.clone(), security.clone());
        let server = EnvelopeService::new(config, security);

        let wire = request_wire(&client, "up=anyone");
        let transport = server.new_transport_from_json(&wire).unwrap();
        let secure = server.new_secure_request_from_transport(&transport, false).unwrap();

        assert_eq!(secure.caller_jwt(), Some(""));
    }
}
