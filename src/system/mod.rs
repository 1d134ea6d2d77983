//! Host collaborators: lease store, interface state and the routing table.
//!
//! The reconciler only talks to these traits so every pass can be exercised
//! against in-memory fakes. Concrete implementations shell out to iproute2
//! and read ISC dhclient lease files.

use anyhow::Result;
use ipnet::Ipv4Net;

use crate::{LeaseRecord, LiveRoute, RouteEntry};

mod command;
mod dhclient;
mod iproute2;

pub use command::{CommandOutput, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
pub use dhclient::{parse_dhclient_leases, DhclientLeases, DEFAULT_LEASE_DIR};
pub use iproute2::{Iproute2, DEFAULT_ROUTE_PROTO};

/// Result of a routing table mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    /// Add of a route that already exists, or remove of one that is gone
    NoOp,
}

pub trait LeaseSource {
    /// Current lease for the interface; `None` when it holds no lease.
    fn lease(&self, interface: &str) -> Result<Option<LeaseRecord>>;
}

pub trait NetworkState {
    /// Interface holding the system default route, if any.
    fn default_interface(&self) -> Result<Option<String>>;

    /// IPv4 networks assigned to the interface, as address/prefix.
    fn interface_addresses(&self, interface: &str) -> Result<Vec<Ipv4Net>>;
}

pub trait RoutingTable {
    /// Routes carrying our origin tag.
    fn list(&self) -> Result<Vec<LiveRoute>>;

    /// A route for exactly this destination that does not carry our tag.
    fn foreign_route(&self, destination: Ipv4Net) -> Result<Option<String>>;

    fn add(&self, route: &RouteEntry, interface: &str) -> Result<OpOutcome>;

    fn remove(&self, destination: Ipv4Net) -> Result<OpOutcome>;
}
