//! # Connection Port
//!
//! The view of an inbound connection the broker hands to [`ChoriaAuth`].
//! The host server implements [`ClientAuthentication`] over its own
//! connection type.
//!
//! [`ChoriaAuth`]: crate::ChoriaAuth

use std::fmt;
use std::net::SocketAddr;

use crate::permissions::User;

/// Credentials and metadata from the peer's CONNECT.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Bearer JWT
    pub token: String,
    /// Raw URL base64 Ed25519 signature over the server nonce
    pub sig: String,
    /// Client supplied connection name
    pub name: String,
}

/// What kind of peer connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Ordinary client, servers included
    Client,
    /// Cluster route
    Router,
    /// Super cluster gateway
    Gateway,
    /// Leafnode
    Leaf,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Router => "router",
            Self::Gateway => "gateway",
            Self::Leaf => "leaf",
        })
    }
}

/// TLS details of a connection.
#[derive(Debug, Clone, Default)]
pub struct TlsConnectionState {
    /// The peer presented a certificate that chains to a trusted CA
    pub verified: bool,
    /// Common name of the peer certificate
    pub peer_common_name: Option<String>,
}

/// Where a connection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAddress {
    /// A network peer
    Tcp(SocketAddr),
    /// An in-process pipe
    Pipe,
}

impl RemoteAddress {
    /// Whether this is an in-process pipe.
    pub fn is_pipe(&self) -> bool {
        matches!(self, Self::Pipe)
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{}", addr),
            Self::Pipe => f.write_str("pipe"),
        }
    }
}

/// A connection being authorized.
pub trait ClientAuthentication {
    /// CONNECT options sent by the peer.
    fn options(&self) -> &ConnectOptions;

    /// TLS state, `None` on plain connections.
    fn tls_state(&self) -> Option<&TlsConnectionState>;

    /// Remote address, when known.
    fn remote_address(&self) -> Option<RemoteAddress>;

    /// Nonce the server sent in its INFO, empty when none was generated.
    fn nonce(&self) -> &[u8];

    /// Kind of connection.
    fn kind(&self) -> ConnectionKind;

    /// Accept the connection as `user`.
    fn register_user(&mut self, user: User);
}
