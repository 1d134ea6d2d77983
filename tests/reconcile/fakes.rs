use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use dhcp121::system::{LeaseSource, NetworkState, OpOutcome, RoutingTable};
use dhcp121::{reconcile, LeaseRecord, LiveRoute, OverridePolicy, ReconcileOutcome, RouteEntry};
use ipnet::Ipv4Net;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

pub fn net(s: &str) -> Ipv4Net {
    s.parse().expect("valid CIDR")
}

pub fn route(dest: &str, gw: &str) -> RouteEntry {
    RouteEntry::new(net(dest), gw.parse().expect("valid gateway"))
}

pub fn live(dest: &str, gw: &str, iface: &str) -> LiveRoute {
    LiveRoute {
        destination: net(dest),
        gateway: gw.parse().expect("valid gateway"),
        interface: iface.to_string(),
    }
}

pub fn lease(iface: &str, option_121: Option<&[u8]>) -> LeaseRecord {
    LeaseRecord {
        interface: iface.to_string(),
        option_121: option_121.map(<[u8]>::to_vec),
        router: None,
        expires: None,
    }
}

#[derive(Default)]
pub struct FakeLeases {
    pub leases: BTreeMap<String, LeaseRecord>,
    pub fail: bool,
}

impl LeaseSource for FakeLeases {
    fn lease(&self, interface: &str) -> Result<Option<LeaseRecord>> {
        if self.fail {
            bail!("lease store unavailable");
        }
        Ok(self.leases.get(interface).cloned())
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    pub default: Option<String>,
    pub addresses: BTreeMap<String, Vec<Ipv4Net>>,
    pub fail: bool,
}

impl NetworkState for FakeNetwork {
    fn default_interface(&self) -> Result<Option<String>> {
        if self.fail {
            bail!("netlink socket closed");
        }
        Ok(self.default.clone())
    }

    fn interface_addresses(&self, interface: &str) -> Result<Vec<Ipv4Net>> {
        Ok(self.addresses.get(interface).cloned().unwrap_or_default())
    }
}

/// In-memory tagged routing table recording every mutation
#[derive(Default)]
pub struct FakeTable {
    pub routes: RefCell<Vec<LiveRoute>>,
    pub fail_add: BTreeSet<Ipv4Net>,
    pub fail_list: bool,
    /// Every mutation is refused with EPERM
    pub read_only: bool,
    /// Routes installed by someone else, keyed by destination
    pub foreign: BTreeMap<Ipv4Net, String>,
    pub mutations: RefCell<Vec<String>>,
}

impl FakeTable {
    pub fn with_routes(routes: Vec<LiveRoute>) -> Self {
        Self {
            routes: RefCell::new(routes),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.borrow().iter().map(|r| r.to_string()).collect();
        routes.sort();
        routes
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.borrow().len()
    }
}

impl RoutingTable for FakeTable {
    fn list(&self) -> Result<Vec<LiveRoute>> {
        if self.fail_list {
            bail!("permission denied");
        }
        Ok(self.routes.borrow().clone())
    }

    fn foreign_route(&self, destination: Ipv4Net) -> Result<Option<String>> {
        Ok(self.foreign.get(&destination).cloned())
    }

    fn add(&self, route: &RouteEntry, interface: &str) -> Result<OpOutcome> {
        self.mutations
            .borrow_mut()
            .push(format!("add {} dev {}", route, interface));
        if self.read_only {
            bail!("RTNETLINK answers: Operation not permitted");
        }
        if self.fail_add.contains(&route.destination) {
            bail!("Network is unreachable");
        }
        let mut routes = self.routes.borrow_mut();
        if self.foreign.contains_key(&route.destination)
            || routes.iter().any(|r| r.destination == route.destination)
        {
            return Ok(OpOutcome::NoOp);
        }
        routes.push(LiveRoute {
            destination: route.destination,
            gateway: route.gateway,
            interface: interface.to_string(),
        });
        Ok(OpOutcome::Applied)
    }

    fn remove(&self, destination: Ipv4Net) -> Result<OpOutcome> {
        self.mutations.borrow_mut().push(format!("del {}", destination));
        if self.read_only {
            bail!("RTNETLINK answers: Operation not permitted");
        }
        let mut routes = self.routes.borrow_mut();
        match routes.iter().position(|r| r.destination == destination) {
            Some(pos) => {
                routes.remove(pos);
                Ok(OpOutcome::Applied)
            }
            None => Ok(OpOutcome::NoOp),
        }
    }
}

/// A host whose default route and only lease sit on `eth0` (192.168.1.10/24).
pub struct FakeHost {
    pub leases: FakeLeases,
    pub network: FakeNetwork,
    pub table: FakeTable,
}

impl FakeHost {
    pub fn eth0(option_121: Option<&[u8]>) -> Self {
        let mut leases = FakeLeases::default();
        leases
            .leases
            .insert("eth0".to_string(), lease("eth0", option_121));

        let mut network = FakeNetwork {
            default: Some("eth0".to_string()),
            ..Default::default()
        };
        network
            .addresses
            .insert("eth0".to_string(), vec![net("192.168.1.10/24")]);

        Self {
            leases,
            network,
            table: FakeTable::default(),
        }
    }

    pub fn run(&self, policy: &OverridePolicy) -> Result<ReconcileOutcome> {
        reconcile(
            policy.clone(),
            &self.leases,
            &self.network,
            &self.table,
            now(),
        )
    }
}

/// 10.0.1.0/24 via 192.168.1.254, 172.16.0.0/16 via 192.168.1.253
pub const TWO_ROUTES: &[u8] = &[
    24, 10, 0, 1, 192, 168, 1, 254, //
    16, 172, 16, 192, 168, 1, 253,
];
