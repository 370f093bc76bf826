//! # ChoriaAuth
//!
//! Authorization of every inbound broker connection.
//!
//! A connection is handled by exactly one path, chosen from its username and
//! TLS state. Each path either registers a fully populated [`User`] or
//! returns an [`AuthError`] that is logged and never shown to the peer.
//! Denial is final for that attempt.

use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use choria_security::tokens::{self, ClientIdClaims, Purpose, ServerClaims, SignerKey};
use subtle::ConstantTimeEq;
use tracing::{debug, error, instrument, warn};

use crate::allow_list::ClientAllowList;
use crate::config::BrokerAuthConfig;
use crate::connection::{ClientAuthentication, ConnectionKind, RemoteAddress};
use crate::errors::AuthError;
use crate::permissions::{Account, SubjectPermission, User};
use crate::signers::Signers;
use crate::PROVISIONING_USER;

/// Constant-time string comparison for credentials.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn remote_label(conn: &dyn ClientAuthentication) -> String {
    conn.remote_address()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Connection authorizer.
///
/// Shared by every accepting thread. The only mutable state is the signer
/// key cache inside [`Signers`].
#[derive(Debug)]
pub struct ChoriaAuth {
    pub(crate) allow_list: ClientAllowList,
    pub(crate) is_tls: bool,
    pub(crate) deny_servers: bool,
    pub(crate) provisioning_token_signer: Option<std::path::PathBuf>,
    pub(crate) signers: Signers,
    pub(crate) choria_account: Option<Account>,
    pub(crate) system_account: Option<Account>,
    pub(crate) provisioning_account: Option<Account>,
    pub(crate) provisioning_password: String,
    pub(crate) system_user: String,
    pub(crate) system_password: String,
}

impl ChoriaAuth {
    /// Authorizer for `config`.
    pub fn new(config: BrokerAuthConfig) -> Self {
        Self {
            allow_list: ClientAllowList::new(config.client_allow_list),
            is_tls: config.tls,
            deny_servers: config.deny_servers,
            provisioning_token_signer: config.provisioning_token_signer,
            signers: Signers::new(config.client_jwt_signers, config.server_jwt_signers, config.issuers),
            choria_account: config.choria_account.map(Account::new),
            system_account: config.system_account.map(Account::new),
            provisioning_account: config.provisioning_account.map(Account::new),
            provisioning_password: config.provisioning_password,
            system_user: config.system_user,
            system_password: config.system_password,
        }
    }

    /// Validate `config` and build an authorizer for it.
    pub fn try_new(config: BrokerAuthConfig) -> Result<Self, crate::ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Signer and issuer resolution used for connection tokens.
    pub fn signers(&self) -> &Signers {
        &self.signers
    }

    /// Authorize `conn`, registering its user when accepted.
    #[instrument(skip(self, conn), fields(stage = "check", remote = %remote_label(&*conn)))]
    pub fn check(&self, conn: &mut dyn ClientAuthentication) -> bool {
        let tls = conn.tls_state().cloned();
        let tls_verified = tls.as_ref().is_some_and(|t| t.verified);

        if self.is_tls && tls.is_none() {
            warn!("Did not receive TLS Connection State for connection, rejecting");
            return false;
        }

        let system_user = self.is_system_user(conn);
        let pipe = conn.remote_address().is_some_and(|r| r.is_pipe());

        let result = if self.is_provision_user(conn) {
            self.handle_provisioning_user_connection(conn, tls_verified)
                .inspect_err(|e| warn!(error = %e, "Handling provisioning user connection failed, denying"))
        } else if system_user && (tls_verified || pipe) {
            self.handle_verified_system_account(conn)
                .inspect_err(|e| warn!(error = %e, "Handling system user failed, denying"))
        } else if system_user && tls.is_none() {
            warn!("System user is only allowed over TLS connections");
            Err(AuthError::Denied("system user is only allowed over TLS connections"))
        } else if system_user {
            self.handle_unverified_system_account(conn)
                .inspect_err(|e| warn!(error = %e, "Handling unverified TLS system user failed, denying"))
        } else {
            match self.handle_default_connection(conn, tls_verified) {
                Err(default_error) if self.is_tls && !tls_verified => {
                    self.handle_unverified_provisioning_connection(conn).inspect_err(|e| {
                        warn!(verified_error = %default_error, unverified_error = %e, "Denying connection")
                    })
                }
                Err(e) => {
                    warn!(verified_error = %e, "Denying connection");
                    Err(e)
                }
                Ok(()) => Ok(()),
            }
        };

        result.is_ok()
    }

    fn is_provision_user(&self, conn: &dyn ClientAuthentication) -> bool {
        conn.options().username == PROVISIONING_USER
    }

    fn is_system_user(&self, conn: &dyn ClientAuthentication) -> bool {
        !self.system_user.is_empty() && conn.options().username == self.system_user
    }

    fn create_user(&self, conn: &dyn ClientAuthentication) -> User {
        let opts = conn.options();

        User {
            username: opts.username.clone(),
            password: opts.password.clone(),
            account: self.choria_account.clone(),
            permissions: Default::default(),
        }
    }

    fn register(&self, conn: &mut dyn ClientAuthentication, user: User) {
        debug!(user = %user.username, account = %user.account_name(), "Registering user");
        conn.register_user(user);
    }

    /// Check an Ed25519 signature over the server nonce using the hex public
    /// key from the peer's JWT.
    pub fn verify_nonce_signature(&self, nonce: &[u8], sig: &str, public_key: &str) -> Result<(), AuthError> {
        if sig.is_empty() {
            return Err(AuthError::Denied("connection nonce was not signed"));
        }

        if public_key.is_empty() {
            return Err(AuthError::Denied(
                "no public key found in the JWT to verify nonce signature",
            ));
        }

        if nonce.is_empty() {
            return Err(AuthError::Denied("server did not generate a nonce to verify"));
        }

        let public_key =
            hex::decode(public_key).map_err(|_| AuthError::Denied("invalid nonce signature"))?;

        let sig = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|e| AuthError::SignatureEncoding(e.to_string()))?;

        let valid = choria_security::ed25519::verify(&public_key, nonce, &sig)
            .map_err(|e| AuthError::NonceVerification(e.to_string()))?;

        if !valid {
            return Err(AuthError::Denied(
                "nonce signature did not verify using pub key in the jwt",
            ));
        }

        debug!("Successfully verified nonce signature");

        Ok(())
    }

    fn verify_server_jwt_based_auth(
        &self,
        remote: Option<RemoteAddress>,
        token: &str,
        nonce: &[u8],
        sig: &str,
    ) -> Result<ServerClaims, AuthError> {
        if remote.is_none() {
            error!("no remote client information received");
            return Err(AuthError::Denied(
                "remote client information is required in anonymous TLS or JWT signing modes",
            ));
        }

        let claims = self.signers.parse_server_jwt(token).map_err(|e| {
            error!(error = %e, "could not parse JWT");
            AuthError::Denied("invalid JWT token")
        })?;

        self.verify_nonce_signature(nonce, sig, &claims.standard.public_key)
            .map_err(|e| {
                error!(error = %e, "nonce signature verification failed");
                AuthError::Denied("invalid nonce signature")
            })?;

        Ok(claims)
    }

    fn verify_client_jwt_based_auth(
        &self,
        remote: Option<RemoteAddress>,
        token: &str,
        nonce: &[u8],
        sig: &str,
    ) -> Result<ClientIdClaims, AuthError> {
        if remote.is_none() {
            error!("no remote connection details received");
            return Err(AuthError::Denied(
                "remote client information is required in anonymous TLS or JWT signing modes",
            ));
        }

        let claims = self.signers.parse_client_id_jwt(token).map_err(|e| {
            error!(error = %e, "could not parse JWT");
            AuthError::Denied("invalid JWT token")
        })?;

        self.verify_nonce_signature(nonce, sig, &claims.standard.public_key)
            .map_err(|e| {
                error!(error = %e, "nonce signature verification failed");
                AuthError::Denied("invalid nonce signature")
            })?;

        Ok(claims)
    }

    /// Connections with mTLS, a JWT and nonce signature, or over a pipe.
    fn handle_default_connection(
        &self,
        conn: &mut dyn ClientAuthentication,
        tls_verified: bool,
    ) -> Result<(), AuthError> {
        let mut user = self.create_user(conn);
        let remote = conn.remote_address();
        let opts = conn.options().clone();
        let has_tls = conn.tls_state().is_some();
        let pipe = remote.is_some_and(|r| r.is_pipe());

        debug!(
            mtls = tls_verified,
            name = %opts.name,
            subject = ?conn.tls_state().and_then(|t| t.peer_common_name.clone()),
            account = %user.account_name(),
            "Handling default connection"
        );

        let mut caller = String::new();
        let mut client_claims = None;
        let mut server_claims = None;

        let jwt_auth = !opts.token.is_empty() && has_tls;

        if jwt_auth {
            let purpose = tokens::token_purpose(&opts.token);
            debug!(purpose = %purpose, "Performing JWT based authentication verification");

            match purpose {
                Purpose::ClientId => {
                    if conn.kind() != ConnectionKind::Client {
                        return Err(AuthError::WrongConnectionKind {
                            purpose: "client",
                            kind: conn.kind(),
                        });
                    }

                    let claims = self
                        .verify_client_jwt_based_auth(remote, &opts.token, conn.nonce(), &opts.sig)
                        .map_err(|_| AuthError::Denied("invalid nonce signature or jwt token"))?;

                    debug!(caller = %claims.callerid, "Extracted caller id from JWT token");

                    caller = claims.callerid.clone();
                    user.username = caller.clone();
                    client_claims = Some(claims);
                }

                Purpose::Server => {
                    if conn.kind() != ConnectionKind::Client {
                        return Err(AuthError::WrongConnectionKind {
                            purpose: "server",
                            kind: conn.kind(),
                        });
                    }

                    let claims = self
                        .verify_server_jwt_based_auth(remote, &opts.token, conn.nonce(), &opts.sig)
                        .map_err(|_| AuthError::Denied("invalid nonce signature or jwt token"))?;

                    debug!(identity = %claims.identity, "Extracted remote identity from JWT token");

                    user.username = claims.identity.clone();
                    server_claims = Some(claims);
                }

                other => return Err(AuthError::UnsupportedPurpose(other)),
            }
        }

        let client_perms = client_claims.is_some();
        let server_perms = server_claims.is_some();

        if !jwt_auth && !tls_verified && !pipe {
            warn!("Rejecting unverified connection without token");
            return Err(AuthError::Denied("unverified connection without JWT token"));
        }

        if client_perms
            || (!server_perms && !caller.is_empty() && self.allow_list.allows(remote.as_ref()))
        {
            debug!("Setting client permissions");
            self.set_client_permissions(&mut user, &caller, client_claims.as_ref());
        } else if server_perms || !self.allow_list.is_empty() {
            self.set_server_permissions(&mut user, server_claims.as_ref());
        } else if pipe {
            debug!("Allowing pipe connection without any limitations");
        }

        self.register(conn, user);

        Ok(())
    }

    fn handle_unverified_system_account(&self, conn: &mut dyn ClientAuthentication) -> Result<(), AuthError> {
        if conn.tls_state().is_none() {
            return Err(AuthError::Denied("requires TLS"));
        }

        let opts = conn.options().clone();

        if opts.token.is_empty() {
            return Err(AuthError::Denied("no JWT token received"));
        }

        let purpose = tokens::token_purpose(&opts.token);
        debug!(purpose = %purpose, name = %opts.name, "Performing JWT based authentication verification for system account access");

        if purpose != Purpose::ClientId {
            return Err(AuthError::Denied("client token required"));
        }

        if conn.kind() != ConnectionKind::Client {
            return Err(AuthError::WrongConnectionKind {
                purpose: "client",
                kind: conn.kind(),
            });
        }

        let claims = self.signers.parse_client_id_jwt(&opts.token).map_err(|e| {
            error!(error = %e, "could not parse JWT");
            AuthError::Denied("invalid JWT token")
        })?;

        let perms = claims.perms();
        if !(perms.system_user || perms.org_admin) {
            return Err(AuthError::Denied("no system_user or org_admin claim"));
        }

        self.verify_nonce_signature(conn.nonce(), &opts.sig, &claims.standard.public_key)
            .map_err(|e| {
                error!(error = %e, "nonce signature verification failed");
                AuthError::Denied("invalid nonce signature")
            })?;

        self.handle_verified_system_account(conn)
    }

    fn handle_verified_system_account(&self, conn: &mut dyn ClientAuthentication) -> Result<(), AuthError> {
        if self.system_user.is_empty() {
            return Err(AuthError::Denied("system user is required"));
        }

        if self.system_password.is_empty() {
            return Err(AuthError::Denied("system password is required"));
        }

        let Some(account) = self.system_account.clone() else {
            return Err(AuthError::Denied("system account is not set"));
        };

        let opts = conn.options();
        let user_matches = constant_time_compare(&opts.username, &self.system_user);
        let pass_matches = constant_time_compare(&opts.password, &self.system_password);

        if !(user_matches && pass_matches) {
            return Err(AuthError::Denied("invalid system credentials"));
        }

        let mut user = self.create_user(conn);
        user.account = Some(account);

        self.register(conn, user);

        Ok(())
    }

    fn handle_provisioning_user_connection(
        &self,
        conn: &mut dyn ClientAuthentication,
        tls_verified: bool,
    ) -> Result<(), AuthError> {
        if self.signers.has_issuers() {
            self.handle_provisioning_user_connection_with_issuer(conn)
        } else {
            self.handle_provisioning_user_connection_with_tls(conn, tls_verified)
        }
    }

    fn check_provisioner_password(&self, password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::Denied("password required"));
        }

        if !constant_time_compare(password, &self.provisioning_password) {
            return Err(AuthError::Denied("invalid provisioner password supplied"));
        }

        Ok(())
    }

    fn handle_provisioning_user_connection_with_issuer(
        &self,
        conn: &mut dyn ClientAuthentication,
    ) -> Result<(), AuthError> {
        if self.provisioning_password.is_empty() {
            return Err(AuthError::Denied("provisioning user password not enabled"));
        }

        let Some(account) = self.provisioning_account.clone() else {
            return Err(AuthError::Denied("provisioning account is not set"));
        };

        let opts = conn.options();

        if opts.token.is_empty() {
            return Err(AuthError::Denied("no token provided in connection"));
        }

        let claims = self.signers.parse_client_id_jwt_with_issuer(&opts.token)?;

        if !claims.perms().server_provisioner {
            return Err(AuthError::NotProvisioner(claims.callerid));
        }

        self.check_provisioner_password(&opts.password)?;

        let mut user = self.create_user(conn);
        user.account = Some(account);

        debug!(caller = %claims.callerid, "Provisioner authenticated using organization issuer claims");
        self.register(conn, user);

        Ok(())
    }

    fn handle_provisioning_user_connection_with_tls(
        &self,
        conn: &mut dyn ClientAuthentication,
        tls_verified: bool,
    ) -> Result<(), AuthError> {
        if !tls_verified {
            return Err(AuthError::Denied(
                "provisioning user is only allowed over verified TLS connections",
            ));
        }

        if self.provisioning_password.is_empty() {
            return Err(AuthError::Denied("provisioning user password not enabled"));
        }

        let Some(account) = self.provisioning_account.clone() else {
            return Err(AuthError::Denied("provisioning account is not set"));
        };

        if !self.is_tls {
            return Err(AuthError::Denied("provisioning user access requires TLS"));
        }

        if conn.tls_state().is_none() {
            return Err(AuthError::Denied("provisioning user can only connect over tls"));
        }

        self.check_provisioner_password(&conn.options().password)?;

        let mut user = self.create_user(conn);
        user.account = Some(account);

        self.register(conn, user);

        Ok(())
    }

    /// Unprovisioned servers presenting a provisioning token over unverified
    /// TLS. They may only reach provisioning subjects.
    fn handle_unverified_provisioning_connection(
        &self,
        conn: &mut dyn ClientAuthentication,
    ) -> Result<(), AuthError> {
        let Some(signer) = self.provisioning_token_signer.as_deref() else {
            return Err(AuthError::Denied("provisioning is not enabled"));
        };

        if !Path::new(signer).exists() {
            return Err(AuthError::ProvisioningSignerMissing(signer.display().to_string()));
        }

        let Some(account) = self.provisioning_account.clone() else {
            return Err(AuthError::Denied("provisioning account is not set"));
        };

        let opts = conn.options();

        if opts.username == PROVISIONING_USER {
            return Err(AuthError::Denied("provisioning user requires verified TLS"));
        }

        if opts.token.is_empty() {
            return Err(AuthError::Denied("provisioning requires a token"));
        }

        let key = SignerKey::from_pem_file(signer)?;
        tokens::parse_provisioning_token(&opts.token, &key)?;

        debug!(remote = %remote_label(conn), "Allowing a provisioning server using an unverified TLS connection");

        let mut user = self.create_user(conn);
        user.account = Some(account);

        user.permissions.subscribe = Some(SubjectPermission::allowing([
            "provisioning.node.>",
            "provisioning.broadcast.agent.discovery",
            "provisioning.broadcast.agent.rpcutil",
            "provisioning.broadcast.agent.choria_util",
            "provisioning.broadcast.agent.choria_provision",
        ]));

        // provisioning.registration.> lets provisioning mode servers publish metadata
        user.permissions.publish = Some(SubjectPermission::allowing([
            "choria.lifecycle.>",
            "provisioning.reply.>",
            "provisioning.registration.>",
        ]));

        self.register(conn, user);

        Ok(())
    }
}
