//! # Broker Authorization
//!
//! Clients and servers holding tokens from the organization connect to a
//! broker that trusts the same key. Checks the resulting subject
//! permissions against the traffic each side needs.

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use chrono::Duration;

    use choria_broker::{
        BrokerAuthConfig, ChoriaAuth, ClientAuthentication, ConnectOptions, ConnectionKind, RemoteAddress,
        TlsConnectionState, User,
    };
    use choria_security::tokens::{
        sign_token, ClientIdClaims, ClientPermissions, Purpose, ServerClaims, ServerPermissions, StandardClaims,
        TokenSigner,
    };
    use choria_security::Ed25519KeyPair;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Connection {
        opts: ConnectOptions,
        tls: Option<TlsConnectionState>,
        nonce: Vec<u8>,
        kind: ConnectionKind,
        user: Option<User>,
    }

    impl Connection {
        fn presenting(token: String, holder: &Ed25519KeyPair) -> Self {
            let nonce = b"a7f3c1 nonce".to_vec();
            Self {
                opts: ConnectOptions {
                    token,
                    sig: URL_SAFE_NO_PAD.encode(holder.sign(&nonce)),
                    ..Default::default()
                },
                tls: Some(TlsConnectionState::default()),
                nonce,
                kind: ConnectionKind::Client,
                user: None,
            }
        }
    }

    impl ClientAuthentication for Connection {
        fn options(&self) -> &ConnectOptions {
            &self.opts
        }

        fn tls_state(&self) -> Option<&TlsConnectionState> {
            self.tls.as_ref()
        }

        fn remote_address(&self) -> Option<RemoteAddress> {
            "198.51.100.7:51522".parse().ok().map(RemoteAddress::Tcp)
        }

        fn nonce(&self) -> &[u8] {
            &self.nonce
        }

        fn kind(&self) -> ConnectionKind {
            self.kind
        }

        fn register_user(&mut self, user: User) {
            self.user = Some(user);
        }
    }

    struct Org {
        issuer: Ed25519KeyPair,
    }

    impl Org {
        fn new() -> Self {
            Self {
                issuer: Ed25519KeyPair::generate(),
            }
        }

        fn broker(&self) -> ChoriaAuth {
            ChoriaAuth::try_new(BrokerAuthConfig {
                client_jwt_signers: vec![self.issuer.public_key_hex()],
                server_jwt_signers: vec![self.issuer.public_key_hex()],
                ..Default::default()
            })
            .unwrap()
        }

        fn client(&self, caller: &str, perms: ClientPermissions) -> Connection {
            let holder = Ed25519KeyPair::generate();
            let claims = ClientIdClaims {
                callerid: caller.into(),
                permissions: Some(perms),
                standard: StandardClaims {
                    public_key: holder.public_key_hex(),
                    ..StandardClaims::new("ginkgo", Purpose::ClientId, Duration::hours(1), false)
                },
                ..Default::default()
            };
            let token = sign_token(&claims, TokenSigner::Ed25519(self.issuer.signing_key())).unwrap();
            Connection::presenting(token, &holder)
        }

        fn server(&self, identity: &str, perms: ServerPermissions) -> Connection {
            let holder = Ed25519KeyPair::generate();
            let claims = ServerClaims {
                identity: identity.into(),
                collectives: vec!["mcollective".into()],
                permissions: Some(perms),
                standard: StandardClaims {
                    public_key: holder.public_key_hex(),
                    ..StandardClaims::new("ginkgo", Purpose::Server, Duration::hours(1), false)
                },
                ..Default::default()
            };
            let token = sign_token(&claims, TokenSigner::Ed25519(self.issuer.signing_key())).unwrap();
            Connection::presenting(token, &holder)
        }
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[test]
    fn test_client_and_server_can_talk() {
        let org = Org::new();
        let broker = org.broker();

        let mut client = org.client(
            "up=ginkgo",
            ClientPermissions {
                fleet_management: true,
                ..Default::default()
            },
        );
        let mut server = org.server("n1.example.net", ServerPermissions::default());

        assert!(broker.check(&mut client));
        assert!(broker.check(&mut server));

        let client = client.user.unwrap();
        let server = server.user.unwrap();

        assert_eq!(client.username, "up=ginkgo");
        assert_eq!(client.account_name(), "choria");
        assert_eq!(server.username, "n1.example.net");

        // client publishes a broadcast, the server receives it
        assert!(client.permissions.can_publish("mcollective.broadcast.agent.rpcutil"));
        assert!(server.permissions.can_subscribe("mcollective.broadcast.agent.rpcutil"));

        // replies go to the private reply subject of the caller
        let reply = choria_broker::subjects::private_reply_subject("up=ginkgo").replace("*", "mcollective");
        let reply = reply.trim_end_matches('>').to_string() + "1";
        assert!(server.permissions.can_publish(&reply));
        assert!(client.permissions.can_subscribe(&reply));
        assert!(!client.permissions.can_subscribe("mcollective.reply.0f47cbbd2accc01a51e57261d6e64b8b.1"));

        // servers cannot eavesdrop on each other
        assert!(!server.permissions.can_subscribe("mcollective.node.n2.example.net"));
        assert!(server.permissions.can_subscribe("mcollective.node.n1.example.net"));
    }

    #[test]
    fn test_org_admin_unrestricted() {
        let org = Org::new();
        let mut client = org.client(
            "up=admin",
            ClientPermissions {
                org_admin: true,
                ..Default::default()
            },
        );

        assert!(org.broker().check(&mut client));
        let user = client.user.unwrap();
        assert!(user.permissions.can_publish("$SYS.REQ.SERVER.PING"));
        assert!(user.permissions.can_subscribe("anything.at.all"));
    }

    #[test]
    fn test_stream_users_get_stream_subjects() {
        let org = Org::new();
        let mut client = org.client(
            "up=ginkgo",
            ClientPermissions {
                streams_user: true,
                ..Default::default()
            },
        );

        assert!(org.broker().check(&mut client));
        let user = client.user.unwrap();
        assert!(user.permissions.can_publish("$JS.API.STREAM.INFO.EVENTS"));
        assert!(!user.permissions.can_publish("$JS.API.STREAM.DELETE.EVENTS"));
    }

    #[test]
    fn test_tokens_from_other_org_rejected() {
        let (ours, theirs) = (Org::new(), Org::new());

        let mut client = theirs.client("up=ginkgo", ClientPermissions::default());
        let mut server = theirs.server("n1.example.net", ServerPermissions::default());

        let broker = ours.broker();
        assert!(!broker.check(&mut client));
        assert!(!broker.check(&mut server));
        assert!(client.user.is_none());
    }

    #[test]
    fn test_server_token_on_leafnode_rejected() {
        let org = Org::new();
        let mut server = org.server("n1.example.net", ServerPermissions::default());
        server.kind = ConnectionKind::Leaf;

        assert!(!org.broker().check(&mut server));
    }

    #[test]
    fn test_deny_servers() {
        let org = Org::new();
        let broker = ChoriaAuth::try_new(BrokerAuthConfig {
            server_jwt_signers: vec![org.issuer.public_key_hex()],
            deny_servers: true,
            ..Default::default()
        })
        .unwrap();

        let mut server = org.server("n1.example.net", ServerPermissions::default());
        assert!(broker.check(&mut server));

        let user = server.user.unwrap();
        assert!(!user.permissions.can_publish("mcollective.reply.x"));
        assert!(!user.permissions.can_subscribe("mcollective.broadcast.agent.rpcutil"));
    }
}
