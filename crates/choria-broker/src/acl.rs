//! Client and server permission builders.

use choria_security::tokens::{ClientIdClaims, ServerClaims};
use tracing::{debug, info, warn};

use crate::auth::ChoriaAuth;
use crate::permissions::{Account, SubjectPermission, User, ALL_SUBJECTS};
use crate::subjects::{private_reply_subject, reply_hash};

const STREAMS_USER_SUBJECTS: [&str; 18] = [
    "$JS.API.INFO",
    "$JS.API.STREAM.NAMES",
    "$JS.API.STREAM.LIST",
    "$JS.API.STREAM.INFO.*",
    "$JS.API.STREAM.MSG.GET.*",
    "$JS.API.STREAM.MSG.DELETE.*",
    "$JS.API.DIRECT.GET.*",
    "$JS.API.DIRECT.GET.*.>",
    "$JS.API.CONSUMER.CREATE.*",
    "$JS.API.CONSUMER.CREATE.*.>",
    "$JS.API.CONSUMER.DURABLE.CREATE.*.*",
    "$JS.API.CONSUMER.DELETE.*.*",
    "$JS.API.CONSUMER.NAMES.*",
    "$JS.API.CONSUMER.LIST.*",
    "$JS.API.CONSUMER.INFO.*.*",
    "$JS.API.CONSUMER.MSG.NEXT.*.*",
    "$JS.ACK.>",
    "$JS.FC.>",
];

const SERVER_STREAMS_SUBJECTS: [&str; 10] = [
    "STREAM.INFO.*",
    "STREAM.MSG.GET.*",
    "STREAM.MSG.DELETE.*",
    "DIRECT.GET.*",
    "DIRECT.GET.*.>",
    "CONSUMER.CREATE.*",
    "CONSUMER.CREATE.*.>",
    "CONSUMER.DURABLE.CREATE.*.*",
    "CONSUMER.INFO.*.*",
    "CONSUMER.MSG.NEXT.*.*",
];

const FLEET_MANAGEMENT_SUBJECTS: [&str; 4] = [
    "*.broadcast.agent.>",
    "*.broadcast.service.>",
    "*.node.>",
    "choria.federation.*.federation",
];

fn extend(list: &mut Vec<String>, subjects: &[&str]) {
    list.extend(subjects.iter().map(|s| s.to_string()));
}

/// Publish and subscribe allow lists under construction.
#[derive(Default)]
struct Grants {
    publish: Vec<String>,
    subscribe: Vec<String>,
}

impl ChoriaAuth {
    fn in_account(&self, user: &User, account: &Option<Account>) -> bool {
        user.account == *account
    }

    fn grant_streams_admin(&self, user: &User, grants: &mut Grants) {
        if !self.in_account(user, &self.choria_account) {
            return;
        }

        grants.subscribe.push("$JS.EVENT.>".to_string());
        grants.publish.push("$JS.>".to_string());
    }

    fn grant_streams_user(&self, user: &User, grants: &mut Grants) {
        if !self.in_account(user, &self.choria_account) {
            return;
        }

        extend(&mut grants.publish, &STREAMS_USER_SUBJECTS);
    }

    fn grant_events_viewer(&self, user: &User, grants: &mut Grants) {
        if self.in_account(user, &self.choria_account) {
            extend(
                &mut grants.subscribe,
                &["choria.lifecycle.event.>", "choria.machine.watcher.>", "choria.machine.transition"],
            );
        } else if self.in_account(user, &self.provisioning_account) {
            grants
                .subscribe
                .push("choria.lifecycle.event.*.provision_mode_server".to_string());
        }
    }

    fn grant_election(&self, user: &User, grants: &mut Grants) {
        if self.in_account(user, &self.choria_account) {
            extend(
                &mut grants.publish,
                &["$JS.API.STREAM.INFO.KV_CHORIA_LEADER_ELECTION", "$KV.CHORIA_LEADER_ELECTION.>"],
            );
        } else if self.in_account(user, &self.provisioning_account) {
            // the provisioner may only join its own election
            extend(
                &mut grants.publish,
                &[
                    "choria.streams.STREAM.INFO.KV_CHORIA_LEADER_ELECTION",
                    "$KV.CHORIA_LEADER_ELECTION.provisioner",
                ],
            );
        }
    }

    fn grant_client_governor(&self, user: &User, grants: &mut Grants) {
        if self.in_account(user, &self.choria_account) {
            grants.publish.push("*.governor.*".to_string());
        }
    }

    /// Allow lists for a client, `None` when it may use every subject.
    fn client_grants(&self, user: &User, caller: &str, claims: Option<&ClientIdClaims>) -> Option<Grants> {
        let perms = claims.and_then(|c| c.permissions.as_ref());

        if perms.is_some_and(|p| p.org_admin) {
            info!(caller = %caller, "Granting user access to all subjects (OrgAdmin)");
            return None;
        }

        let mut grants = Grants::default();

        let replies = private_reply_subject(caller);
        if !caller.is_empty() {
            debug!(subject = %replies, "Creating ACLs for a private reply subject");
        }
        grants.subscribe.push(replies);

        if let Some(claims) = claims {
            grants.subscribe.extend(claims.additional_subscribe_subjects.iter().cloned());
            grants.publish.extend(claims.additional_publish_subjects.iter().cloned());
        }

        let Some(perms) = perms else {
            return Some(grants);
        };

        if perms.streams_admin {
            debug!("Granting user Streams Admin access");
            self.grant_streams_admin(user, &mut grants);
        }

        if perms.streams_user {
            debug!("Granting user Streams User access");
            self.grant_streams_user(user, &mut grants);
        }

        if perms.events_viewer {
            debug!("Granting user Events Viewer access");
            self.grant_events_viewer(user, &mut grants);
        }

        if perms.election_user {
            debug!("Granting user Leader Election access");
            self.grant_election(user, &mut grants);
        }

        if perms.governor && (perms.streams_user || perms.streams_admin) {
            debug!("Granting user Governor access");
            self.grant_client_governor(user, &mut grants);
        }

        if perms.fleet_management || perms.signed_fleet_management {
            debug!("Granting user fleet management access");
            extend(&mut grants.publish, &FLEET_MANAGEMENT_SUBJECTS);
        }

        Some(grants)
    }

    /// Restrict `user` to client subjects.
    ///
    /// Without claims a client may only subscribe to its private reply
    /// subject. Claims add streams, events, elections, governors and fleet
    /// management. Organization admins may use every subject.
    pub fn set_client_permissions(&self, user: &mut User, caller: &str, claims: Option<&ClientIdClaims>) {
        let (publish, subscribe) = match self.client_grants(user, caller, claims) {
            Some(grants) => (grants.publish, grants.subscribe),
            None => (vec![ALL_SUBJECTS.to_string()], vec![ALL_SUBJECTS.to_string()]),
        };

        user.permissions.publish = Some(SubjectPermission::allowing(publish));
        user.permissions.subscribe = Some(SubjectPermission::allowing(subscribe));

        debug!(permissions = ?user.permissions, "Setting client permissions");
    }

    fn set_deny_servers_permissions(&self, user: &mut User) {
        user.permissions.subscribe = Some(SubjectPermission::deny_all());
        user.permissions.publish = Some(SubjectPermission::deny_all());
    }

    fn set_claims_based_server_permissions(&self, user: &mut User, claims: &ServerClaims) {
        if claims.collectives.is_empty() {
            warn!(identity = %claims.identity, "No collectives in server token, denying access");
            self.set_deny_servers_permissions(user);
            return;
        }

        let perms = claims.perms();
        let mut grants = Grants::default();

        extend(
            &mut grants.publish,
            &["choria.lifecycle.>", "choria.machine.transition", "choria.machine.watcher.>"],
        );
        grants.publish.extend(claims.additional_publish_subjects.iter().cloned());

        let reply = reply_hash(&claims.identity);

        for collective in &claims.collectives {
            grants.publish.push(format!("{}.reply.>", collective));
            grants.publish.push(format!("{}.broadcast.agent.registration", collective));
            grants.publish.push(format!("choria.federation.{}.collective", collective));

            grants.subscribe.push(format!("{}.broadcast.agent.>", collective));
            grants.subscribe.push(format!("{}.node.{}", collective, claims.identity));
            grants.subscribe.push(format!("{}.reply.{}.>", collective, reply));

            if perms.service_host {
                grants.subscribe.push(format!("{}.broadcast.service.>", collective));
            }

            if perms.submission {
                grants.publish.push(format!("{}.submission.in.>", collective));
            }

            if perms.governor && perms.streams {
                grants.publish.push(format!("{}.governor.*", collective));
            }
        }

        if perms.streams {
            let prefix = if claims.organization_unit == "choria" {
                "$JS.API"
            } else {
                "choria.streams"
            };

            grants
                .publish
                .extend(SERVER_STREAMS_SUBJECTS.iter().map(|s| format!("{}.{}", prefix, s)));
            extend(&mut grants.publish, &["$JS.ACK.>", "$JS.FC.>"]);
        }

        user.permissions.publish = Some(SubjectPermission::allowing(grants.publish));
        user.permissions.subscribe = Some(SubjectPermission::allowing(grants.subscribe));
    }

    fn set_default_server_permissions(&self, user: &mut User) {
        user.permissions.subscribe = Some(SubjectPermission {
            allow: Vec::new(),
            deny: vec![
                "*.reply.>".to_string(),
                "choria.federation.>".to_string(),
                "choria.lifecycle.>".to_string(),
            ],
        });

        user.permissions.publish = Some(SubjectPermission {
            allow: vec![ALL_SUBJECTS.to_string()],
            deny: FLEET_MANAGEMENT_SUBJECTS.iter().map(|s| s.to_string()).collect(),
        });
    }

    /// Restrict `user` to server subjects.
    ///
    /// Denies everything when servers are denied, derives subjects from the
    /// token when there is one, and otherwise keeps servers away from client
    /// subjects.
    pub fn set_server_permissions(&self, user: &mut User, claims: Option<&ServerClaims>) {
        match claims {
            _ if self.deny_servers => {
                debug!("Setting server permissions, denying servers");
                self.set_deny_servers_permissions(user);
            }
            Some(claims) => {
                debug!("Setting server permissions based on token claims");
                self.set_claims_based_server_permissions(user, claims);
            }
            None => {
                debug!("Setting default server permissions");
                self.set_default_server_permissions(user);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::ChoriaAuth;
    use crate::config::BrokerAuthConfig;
    use crate::permissions::{Account, SubjectPermission, User};
    use choria_security::tokens::{ClientIdClaims, ClientPermissions, ServerClaims, ServerPermissions};

    // ===== TEST FIXTURES =====

    fn auth(deny_servers: bool) -> ChoriaAuth {
        ChoriaAuth::new(BrokerAuthConfig {
            deny_servers,
            ..Default::default()
        })
    }

    fn fleet_user() -> User {
        User {
            account: Some(Account::new("choria")),
            ..Default::default()
        }
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn client(perms: ClientPermissions) -> ClientIdClaims {
        ClientIdClaims {
            callerid: "up=bob".into(),
            permissions: Some(perms),
            ..Default::default()
        }
    }

    fn server(collectives: &[&str], perms: ServerPermissions, ou: &str) -> ServerClaims {
        ServerClaims {
            identity: "n1.example.net".into(),
            collectives: strings(collectives),
            permissions: Some(perms),
            organization_unit: ou.into(),
            ..Default::default()
        }
    }

    // ===== CLIENT TESTS =====

    #[test]
    fn test_private_reply_for_caller() {
        let mut user = fleet_user();
        auth(false).set_client_permissions(&mut user, "u=ginkgo", None);

        assert_eq!(
            user.permissions.subscribe,
            Some(SubjectPermission::allowing(["*.reply.0f47cbbd2accc01a51e57261d6e64b8b.>"]))
        );
        assert_eq!(user.permissions.publish, Some(SubjectPermission::default()));
        assert!(user.permissions.response.is_none());
    }

    #[test]
    fn test_all_replies_without_caller() {
        let mut user = fleet_user();
        auth(false).set_client_permissions(&mut user, "", None);

        assert_eq!(user.permissions.subscribe.unwrap().allow, strings(&["*.reply.>"]));
    }

    #[test]
    fn test_org_admin_gets_everything() {
        let mut user = fleet_user();
        let claims = client(ClientPermissions {
            org_admin: true,
            ..Default::default()
        });
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        assert_eq!(user.permissions.publish.unwrap().allow, strings(&[">"]));
        assert_eq!(user.permissions.subscribe.unwrap().allow, strings(&[">"]));
    }

    #[test]
    fn test_fleet_management() {
        let mut user = fleet_user();
        let claims = client(ClientPermissions {
            signed_fleet_management: true,
            ..Default::default()
        });
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        let publish = user.permissions.publish.unwrap();
        assert_eq!(
            publish.allow,
            strings(&[
                "*.broadcast.agent.>",
                "*.broadcast.service.>",
                "*.node.>",
                "choria.federation.*.federation"
            ])
        );
        assert!(publish.permits("mcollective.node.n1"));
    }

    #[test]
    fn test_additional_subjects() {
        let mut user = fleet_user();
        let claims = ClientIdClaims {
            callerid: "up=bob".into(),
            additional_publish_subjects: strings(&["custom.pub"]),
            additional_subscribe_subjects: strings(&["custom.sub"]),
            ..Default::default()
        };
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        assert_eq!(user.permissions.publish.unwrap().allow, strings(&["custom.pub"]));
        assert!(user.permissions.subscribe.unwrap().allow.contains(&"custom.sub".to_string()));
    }

    #[test]
    fn test_streams_and_governor() {
        let mut user = fleet_user();
        let claims = client(ClientPermissions {
            streams_admin: true,
            governor: true,
            ..Default::default()
        });
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        let publish = user.permissions.publish.unwrap().allow;
        assert!(publish.contains(&"$JS.>".to_string()));
        assert!(publish.contains(&"*.governor.*".to_string()));
        assert!(user.permissions.subscribe.unwrap().allow.contains(&"$JS.EVENT.>".to_string()));
    }

    #[test]
    fn test_governor_needs_streams() {
        let mut user = fleet_user();
        let claims = client(ClientPermissions {
            governor: true,
            ..Default::default()
        });
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        assert!(user.permissions.publish.unwrap().allow.is_empty());
    }

    #[test]
    fn test_streams_only_in_fleet_account() {
        let mut user = User {
            account: Some(Account::new("provisioning")),
            ..Default::default()
        };
        let claims = client(ClientPermissions {
            streams_user: true,
            events_viewer: true,
            election_user: true,
            ..Default::default()
        });
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        assert_eq!(
            user.permissions.publish.unwrap().allow,
            strings(&[
                "choria.streams.STREAM.INFO.KV_CHORIA_LEADER_ELECTION",
                "$KV.CHORIA_LEADER_ELECTION.provisioner"
            ])
        );
        assert!(user
            .permissions
            .subscribe
            .unwrap()
            .allow
            .contains(&"choria.lifecycle.event.*.provision_mode_server".to_string()));
    }

    #[test]
    fn test_events_viewer_in_fleet_account() {
        let mut user = fleet_user();
        let claims = client(ClientPermissions {
            events_viewer: true,
            election_user: true,
            ..Default::default()
        });
        auth(false).set_client_permissions(&mut user, "up=bob", Some(&claims));

        let subscribe = user.permissions.subscribe.unwrap().allow;
        assert!(subscribe.contains(&"choria.machine.transition".to_string()));
        assert!(user
            .permissions
            .publish
            .unwrap()
            .allow
            .contains(&"$KV.CHORIA_LEADER_ELECTION.>".to_string()));
    }

    // ===== SERVER TESTS =====

    #[test]
    fn test_default_server_permissions() {
        let mut user = fleet_user();
        auth(false).set_server_permissions(&mut user, None);

        let subscribe = user.permissions.subscribe.unwrap();
        assert!(subscribe.allow.is_empty());
        assert_eq!(
            subscribe.deny,
            strings(&["*.reply.>", "choria.federation.>", "choria.lifecycle.>"])
        );

        let publish = user.permissions.publish.unwrap();
        assert_eq!(publish.allow, strings(&[">"]));
        assert_eq!(
            publish.deny,
            strings(&[
                "*.broadcast.agent.>",
                "*.broadcast.service.>",
                "*.node.>",
                "choria.federation.*.federation"
            ])
        );
        assert!(publish.permits("mcollective.reply.abc"));
        assert!(!publish.permits("mcollective.broadcast.agent.rpcutil"));
    }

    #[test]
    fn test_deny_servers() {
        let mut user = fleet_user();
        let claims = server(&["mcollective"], ServerPermissions::default(), "choria");
        auth(true).set_server_permissions(&mut user, Some(&claims));

        assert_eq!(user.permissions.subscribe, Some(SubjectPermission::deny_all()));
        assert_eq!(user.permissions.publish, Some(SubjectPermission::deny_all()));
    }

    #[test]
    fn test_claims_without_collectives_deny() {
        let mut user = fleet_user();
        let claims = server(&[], ServerPermissions::default(), "choria");
        auth(false).set_server_permissions(&mut user, Some(&claims));

        assert_eq!(user.permissions.publish, Some(SubjectPermission::deny_all()));
    }

    #[test]
    fn test_claims_based_server_permissions() {
        let mut user = fleet_user();
        let claims = server(
            &["mcollective", "other"],
            ServerPermissions {
                submission: true,
                service_host: true,
                ..Default::default()
            },
            "choria",
        );
        auth(false).set_server_permissions(&mut user, Some(&claims));

        let subscribe = user.permissions.subscribe.unwrap();
        assert!(subscribe.permits("mcollective.broadcast.agent.rpcutil"));
        assert!(subscribe.permits("other.node.n1.example.net"));
        assert!(subscribe.permits("other.broadcast.service.x"));
        assert!(!subscribe.permits("mcollective.node.n2.example.net"));
        assert!(!subscribe.permits("third.broadcast.agent.rpcutil"));

        let publish = user.permissions.publish.unwrap();
        assert!(publish.permits("mcollective.submission.in.x"));
        assert!(publish.permits("choria.federation.other.collective"));
        assert!(!publish.permits("mcollective.governor.x"));
        assert!(!publish.permits("$JS.ACK.x"));
    }

    #[test]
    fn test_server_streams_prefix() {
        let perms = ServerPermissions {
            streams: true,
            governor: true,
            ..Default::default()
        };

        let mut user = fleet_user();
        auth(false).set_server_permissions(&mut user, Some(&server(&["c"], perms.clone(), "choria")));
        let publish = user.permissions.publish.unwrap();
        assert!(publish.permits("$JS.API.STREAM.INFO.X"));
        assert!(publish.permits("c.governor.g"));
        assert!(publish.permits("$JS.ACK.x"));

        let mut user = fleet_user();
        auth(false).set_server_permissions(&mut user, Some(&server(&["c"], perms, "acme")));
        let publish = user.permissions.publish.unwrap();
        assert!(publish.permits("choria.streams.STREAM.INFO.X"));
        assert!(!publish.permits("$JS.API.STREAM.INFO.X"));
    }
}
