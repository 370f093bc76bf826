//! Client allow list.
//!
//! Entries are exact IP addresses or CIDR networks. Connections from inside
//! the list may receive client permissions.

use std::net::IpAddr;

use tracing::warn;

use crate::connection::RemoteAddress;

/// An IP network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `addr/prefix`.
    pub fn parse(value: &str) -> Result<Self, String> {
        let (addr, prefix) = value
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR address: {}", value))?;

        let network: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR address: {}", value))?;

        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= max)
            .ok_or_else(|| format!("invalid CIDR address: {}", value))?;

        Ok(Self { network, prefix })
    }

    /// Whether `ip` falls inside this network.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                masked(u32::from(net) as u128, 32, self.prefix)
                    == masked(u32::from(ip) as u128, 32, self.prefix)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                masked(u128::from(net), 128, self.prefix) == masked(u128::from(ip), 128, self.prefix)
            }
            _ => false,
        }
    }
}

fn masked(value: u128, width: u32, prefix: u8) -> u128 {
    let host_bits = width - u32::from(prefix);
    if host_bits >= 128 {
        return 0;
    }

    value >> host_bits
}

/// Hosts and networks allowed to act as clients.
#[derive(Debug, Clone, Default)]
pub struct ClientAllowList {
    entries: Vec<String>,
}

impl ClientAllowList {
    /// Allow list of `entries`.
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Whether no entries are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entries.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether `remote` is allowed.
    ///
    /// An empty list allows everything, a missing remote otherwise never
    /// matches.
    pub fn allows(&self, remote: Option<&RemoteAddress>) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        let ip = match remote {
            // dual stack listeners report IPv4 clients as ::ffff:a.b.c.d
            Some(RemoteAddress::Tcp(addr)) => addr.ip().to_canonical(),
            Some(other) => {
                warn!(remote = %other, "Could not extract host from remote, not allowing access to client targets");
                return false;
            }
            None => return false,
        };

        let host = ip.to_string();

        self.entries.iter().any(|allowed| {
            if *allowed == host {
                return true;
            }

            if !allowed.contains('/') {
                return false;
            }

            match Cidr::parse(allowed) {
                Ok(cidr) => cidr.contains(ip),
                Err(e) => {
                    warn!(entry = %allowed, error = %e, "Could not parse allow list entry as a cidr");
                    false
                }
            }
        })
    }
}
