//! # Users and Permissions
//!
//! What a connection is registered as. A `None` permission means the
//! connection is not restricted in that direction.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::subjects::subject_matches;

/// Every subject.
pub const ALL_SUBJECTS: &str = ">";

/// A broker account, isolating one set of subjects from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Account {
    name: String,
}

impl Account {
    /// Account called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Account name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Allowed and denied subject patterns for one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectPermission {
    /// Patterns that are permitted, empty permits everything
    pub allow: Vec<String>,
    /// Patterns that are refused, these win over `allow`
    pub deny: Vec<String>,
}

impl SubjectPermission {
    /// Permission allowing only `allow`.
    pub fn allowing<S: Into<String>>(allow: impl IntoIterator<Item = S>) -> Self {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            deny: Vec::new(),
        }
    }

    /// Permission refusing every subject.
    pub fn deny_all() -> Self {
        Self {
            allow: Vec::new(),
            deny: vec![ALL_SUBJECTS.to_string()],
        }
    }

    /// Whether `subject` is permitted.
    pub fn permits(&self, subject: &str) -> bool {
        if self.deny.iter().any(|p| subject_matches(p, subject)) {
            return false;
        }

        self.allow.is_empty() || self.allow.iter().any(|p| subject_matches(p, subject))
    }
}

/// Limits on replies to received requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsePermission {
    /// Replies allowed per request
    pub max_msgs: usize,
    /// How long the reply permission lasts
    pub expires: Duration,
}

/// Subject permissions of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions {
    /// Publish rules
    pub publish: Option<SubjectPermission>,
    /// Subscribe rules
    pub subscribe: Option<SubjectPermission>,
    /// Reply rules
    pub response: Option<ResponsePermission>,
}

impl Permissions {
    /// Whether publishing to `subject` is permitted.
    pub fn can_publish(&self, subject: &str) -> bool {
        self.publish.as_ref().map_or(true, |p| p.permits(subject))
    }

    /// Whether subscribing to `subject` is permitted.
    pub fn can_subscribe(&self, subject: &str) -> bool {
        self.subscribe.as_ref().map_or(true, |p| p.permits(subject))
    }

    /// No restriction in any direction.
    pub fn is_unrestricted(&self) -> bool {
        self.publish.is_none() && self.subscribe.is_none() && self.response.is_none()
    }
}

/// An authorized connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// Username, the caller id or identity for JWT connections
    pub username: String,
    /// Password as supplied
    pub password: String,
    /// Account, `None` for the default account
    pub account: Option<Account>,
    /// Subject permissions
    pub permissions: Permissions,
}

impl User {
    /// Name of the account, `default` when none.
    pub fn account_name(&self) -> &str {
        self.account.as_ref().map_or("default", |a| a.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_wins() {
        let perm = SubjectPermission {
            allow: vec![ALL_SUBJECTS.into()],
            deny: vec!["*.node.>".into()],
        };

        assert!(perm.permits("choria.lifecycle.event"));
        assert!(!perm.permits("mcollective.node.n1"));
    }

    #[test]
    fn test_empty_allow_permits_everything_not_denied() {
        let perm = SubjectPermission {
            allow: vec![],
            deny: vec!["*.reply.>".into()],
        };

        assert!(perm.permits("x.broadcast.agent.rpcutil"));
        assert!(!perm.permits("x.reply.abc"));
    }

    #[test]
    fn test_deny_all() {
        let perm = SubjectPermission::deny_all();
        assert!(!perm.permits("a"));
        assert!(!perm.permits("a.b.c"));
    }

    #[test]
    fn test_unset_permissions_are_unrestricted() {
        let perms = Permissions::default();
        assert!(perms.is_unrestricted());
        assert!(perms.can_publish("anything"));
        assert!(perms.can_subscribe("anything"));
    }

    #[test]
    fn test_account_name() {
        let mut user = User::default();
        assert_eq!(user.account_name(), "default");

        user.account = Some(Account::new("choria"));
        assert_eq!(user.account_name(), "choria");
    }
}
