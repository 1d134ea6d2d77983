use ipnet::Ipv4Net;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::gateway::gateway_reachable;
use crate::{is_managed_destination, LiveRoute, ResolvedInterface, RouteEntry, RouteError};

/// Why an installed route is being withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveReason {
    /// No longer advertised or forced for the resolved interface
    NotAdvertised,
    /// Belongs to an offline safe NIC or to a force NIC
    InterfaceCleanup,
    /// A second tagged route for a destination already handled
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOp {
    Add {
        route: RouteEntry,
        interface: String,
    },
    Replace {
        old: LiveRoute,
        route: RouteEntry,
        interface: String,
    },
    Remove {
        old: LiveRoute,
        reason: RemoveReason,
    },
}

impl RouteOp {
    pub fn destination(&self) -> Ipv4Net {
        match self {
            RouteOp::Add { route, .. } | RouteOp::Replace { route, .. } => route.destination,
            RouteOp::Remove { old, .. } => old.destination,
        }
    }
}

/// Everything a pass needs, already read from the host.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub resolved: Option<&'a ResolvedInterface>,
    pub decoded: &'a [RouteEntry],
    pub forced: &'a [RouteEntry],
    pub addresses: &'a [Ipv4Net],
    pub gateway_check: bool,
    pub live: &'a [LiveRoute],
    pub cleanup_nics: &'a BTreeSet<String>,
    /// Routes we did not install that already hold a desired destination,
    /// as printed by the routing table
    pub untagged: &'a BTreeMap<Ipv4Net, String>,
}

/// A desired route that cannot be added because another route owns its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedRoute {
    pub route: RouteEntry,
    pub interface: String,
    pub existing: String,
}

impl fmt::Display for ShadowedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dev {} (held by: {})",
            self.route, self.interface, self.existing
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Removals first, then replacements, then additions
    pub ops: Vec<RouteOp>,
    pub unchanged: Vec<LiveRoute>,
    pub rejected: Vec<RouteError>,
    pub shadowed: Vec<ShadowedRoute>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The tagged table as it will look once every operation succeeds
    pub fn projected(&self, live: &[LiveRoute]) -> Vec<LiveRoute> {
        let mut table: Vec<LiveRoute> = live.to_vec();
        for op in &self.ops {
            match op {
                RouteOp::Remove { old, .. } => {
                    if let Some(pos) = table.iter().position(|r| r == old) {
                        table.remove(pos);
                    }
                }
                RouteOp::Replace {
                    old,
                    route,
                    interface,
                } => {
                    if let Some(pos) = table.iter().position(|r| r == old) {
                        table.remove(pos);
                    }
                    table.push(installed(route, interface));
                }
                RouteOp::Add { route, interface } => table.push(installed(route, interface)),
            }
        }
        table.sort_by(|a, b| a.destination.cmp(&b.destination));
        table
    }
}

fn installed(route: &RouteEntry, interface: &str) -> LiveRoute {
    LiveRoute {
        destination: route.destination,
        gateway: route.gateway,
        interface: interface.to_string(),
    }
}

/// Collapse decoded and forced routes to one entry per destination.
///
/// Later decoded entries replace earlier ones; forced routes replace both.
pub fn desired_routes(decoded: &[RouteEntry], forced: &[RouteEntry]) -> Vec<RouteEntry> {
    let mut by_destination = BTreeMap::new();
    for route in decoded.iter().chain(forced) {
        by_destination.insert(route.destination, *route);
    }
    by_destination.into_values().collect()
}

/// Diff the desired routes against the tagged live table.
pub fn plan_reconcile(input: PlanInput<'_>) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut removes = Vec::new();
    let mut replaces = Vec::new();
    let mut adds = Vec::new();

    let mut live_by_destination: BTreeMap<Ipv4Net, &LiveRoute> = BTreeMap::new();
    for live in input.live {
        if live_by_destination.contains_key(&live.destination) {
            removes.push(RouteOp::Remove {
                old: live.clone(),
                reason: RemoveReason::Duplicate,
            });
        } else {
            live_by_destination.insert(live.destination, live);
        }
    }

    let mut claimed = BTreeSet::new();

    if let Some(resolved) = input.resolved {
        let interface = resolved.name.as_str();

        for route in desired_routes(input.decoded, input.forced) {
            if route.destination.prefix_len() == 0 {
                info!(
                    interface,
                    gateway = %route.gateway,
                    "leaving the default route to the DHCP client"
                );
                continue;
            }
            if !is_managed_destination(route.destination) {
                info!(interface, route = %route, "leaving link-local destination alone");
                continue;
            }

            if !gateway_reachable(route.gateway, input.addresses, input.gateway_check) {
                let err = RouteError::GatewayUnreachable {
                    destination: route.destination,
                    gateway: route.gateway,
                    interface: interface.to_string(),
                };
                warn!(interface, destination = %route.destination, "{}", err);
                plan.rejected.push(err);
                continue;
            }

            claimed.insert(route.destination);
            match live_by_destination.get(&route.destination) {
                Some(live) if live.gateway == route.gateway && live.interface == interface => {
                    debug!(route = %live, "route already installed");
                    plan.unchanged.push((*live).clone());
                }
                Some(live) => replaces.push(RouteOp::Replace {
                    old: (*live).clone(),
                    route,
                    interface: interface.to_string(),
                }),
                None => match input.untagged.get(&route.destination) {
                    Some(existing) => {
                        warn!(
                            interface,
                            route = %route,
                            existing = existing.as_str(),
                            "destination already routed by another source, not adding"
                        );
                        plan.shadowed.push(ShadowedRoute {
                            route,
                            interface: interface.to_string(),
                            existing: existing.clone(),
                        });
                    }
                    None => adds.push(RouteOp::Add {
                        route,
                        interface: interface.to_string(),
                    }),
                },
            }
        }

        // Other interfaces are only touched by cleanup
        for (destination, live) in &live_by_destination {
            if !claimed.contains(destination) && live.interface == interface {
                removes.push(RouteOp::Remove {
                    old: (*live).clone(),
                    reason: RemoveReason::NotAdvertised,
                });
                claimed.insert(*destination);
            }
        }
    }

    for (destination, live) in &live_by_destination {
        if !claimed.contains(destination) && input.cleanup_nics.contains(&live.interface) {
            removes.push(RouteOp::Remove {
                old: (*live).clone(),
                reason: RemoveReason::InterfaceCleanup,
            });
        }
    }

    plan.ops.extend(removes);
    plan.ops.extend(replaces);
    plan.ops.extend(adds);
    plan
}
