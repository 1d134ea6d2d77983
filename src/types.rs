use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use crate::RouteError;

/// A classless static route: destination network plus next-hop gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    pub destination: Ipv4Net,
    pub gateway: Ipv4Addr,
}

impl RouteEntry {
    /// Build an entry, clearing host bits below the prefix length.
    pub fn new(destination: Ipv4Net, gateway: Ipv4Addr) -> Self {
        Self {
            destination: destination.trunc(),
            gateway,
        }
    }
}

/// Destinations this tool installs and tracks: never the default route,
/// never link-local (169.254.0.0/16).
pub fn is_managed_destination(destination: Ipv4Net) -> bool {
    destination.prefix_len() > 0 && !destination.network().is_link_local()
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.destination, self.gateway)
    }
}

/// A route carrying our origin tag, as currently present in the kernel table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveRoute {
    pub destination: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub interface: String,
}

impl fmt::Display for LiveRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} dev {}",
            self.destination, self.gateway, self.interface
        )
    }
}

/// DHCP lease state for one interface, read fresh on every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub interface: String,
    pub option_121: Option<Vec<u8>>,
    pub router: Option<Ipv4Addr>,
    /// `None` means the lease never expires.
    pub expires: Option<DateTime<Utc>>,
}

impl LeaseRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires.map_or(true, |expires| expires > now)
    }
}

/// Operator policy read from the override file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePolicy {
    pub nic: Option<String>,
    pub gateway_check: bool,
    pub safe_nics: BTreeSet<String>,
    pub force_nics: BTreeSet<String>,
    pub forced_routes: Vec<RouteEntry>,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            nic: None,
            gateway_check: true,
            safe_nics: BTreeSet::new(),
            force_nics: BTreeSet::new(),
            forced_routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceSource {
    /// Pinned with `nic = ...` in the override file
    Pinned,
    /// Holder of the system default route
    DefaultRoute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterface {
    pub name: String,
    pub source: InterfaceSource,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub replaced: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub rejected: usize,
    /// Desired routes whose destination is held by a route we did not install
    pub shadowed: usize,
    pub failures: Vec<RouteError>,
}

impl ReconcileStats {
    pub fn changes(&self) -> usize {
        self.added + self.replaced + self.removed
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Every attempted mutation was refused for lack of privileges
    pub fn permission_denied(&self) -> bool {
        self.changes() == 0
            && !self.failures.is_empty()
            && self.failures.iter().all(RouteError::is_permission_denied)
    }
}
