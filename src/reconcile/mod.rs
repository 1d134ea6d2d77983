//! One reconciliation pass: read host state, diff, apply.
//!
//! Nothing is remembered between passes. Every run re-reads the lease, the
//! interface addresses and the tagged routing table, so a pass that was cut
//! short or raced with another one is corrected by the next.

use anyhow::Result;
use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::option121::decode_option_121;
use crate::resolve::resolve_interface;
use crate::system::{LeaseSource, NetworkState, RoutingTable};
use crate::{
    is_managed_destination, LeaseRecord, LiveRoute, OverridePolicy, ReconcileStats, ResolvedInterface, RouteEntry,
    RouteError,
};

mod apply;
mod plan;

pub use apply::apply_plan;
pub use plan::{
    desired_routes, plan_reconcile, PlanInput, ReconcilePlan, RemoveReason, RouteOp, ShadowedRoute,
};

/// Host state read at the start of a pass
#[derive(Debug, Clone)]
pub struct HostState {
    pub policy: OverridePolicy,
    pub resolved: Option<ResolvedInterface>,
    /// Active lease of the resolved interface
    pub lease: Option<LeaseRecord>,
    pub decoded: Vec<RouteEntry>,
    pub decode_error: Option<RouteError>,
    pub addresses: Vec<Ipv4Net>,
    pub live: Vec<LiveRoute>,
    pub cleanup_nics: BTreeSet<String>,
    /// Untagged routes holding destinations we want, keyed by destination
    pub untagged: BTreeMap<Ipv4Net, String>,
}

impl HostState {
    pub fn plan(&self) -> ReconcilePlan {
        plan_reconcile(PlanInput {
            resolved: self.resolved.as_ref(),
            decoded: &self.decoded,
            forced: &self.policy.forced_routes,
            addresses: &self.addresses,
            gateway_check: self.policy.gateway_check,
            live: &self.live,
            cleanup_nics: &self.cleanup_nics,
            untagged: &self.untagged,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub state: HostState,
    pub plan: ReconcilePlan,
    pub stats: ReconcileStats,
}

/// Interfaces whose tagged routes are cleared regardless of the lease:
/// safe NICs without an active lease, plus every force NIC.
pub fn cleanup_interfaces(
    policy: &OverridePolicy,
    active_leases: &BTreeSet<String>,
) -> BTreeSet<String> {
    policy
        .safe_nics
        .iter()
        .filter(|nic| !active_leases.contains(*nic))
        .chain(policy.force_nics.iter())
        .cloned()
        .collect()
}

fn active_lease(
    leases: &dyn LeaseSource,
    interface: &str,
    now: DateTime<Utc>,
) -> Result<Option<LeaseRecord>> {
    let lease = leases
        .lease(interface)
        .map_err(|e| RouteError::state_query(format!("lease for {}", interface), &e))?;
    Ok(lease.filter(|lease| {
        let active = lease.is_active(now);
        if !active {
            debug!(interface, "lease has expired");
        }
        active
    }))
}

/// Read everything a pass needs. Failures here abort the pass.
pub fn gather_state(
    policy: OverridePolicy,
    leases: &dyn LeaseSource,
    network: &dyn NetworkState,
    table: &dyn RoutingTable,
    now: DateTime<Utc>,
) -> Result<HostState> {
    let default_iface = network
        .default_interface()
        .map_err(|e| RouteError::state_query("default route", &e))?;
    let resolved = resolve_interface(&policy, default_iface.as_deref());

    let mut lease = None;
    let mut decoded = Vec::new();
    let mut decode_error = None;
    let mut addresses = Vec::new();

    if let Some(resolved) = &resolved {
        info!(interface = %resolved.name, source = ?resolved.source, "resolved interface");

        lease = active_lease(leases, &resolved.name, now)?;
        match lease.as_ref().and_then(|l| l.option_121.as_deref()) {
            Some(bytes) => match decode_option_121(bytes) {
                Ok(routes) => decoded = routes,
                Err(e) => {
                    warn!(interface = %resolved.name, "{}; ignoring advertised routes", e);
                    decode_error = Some(e);
                }
            },
            None => debug!(interface = %resolved.name, "no option 121 in lease"),
        }

        addresses = network
            .interface_addresses(&resolved.name)
            .map_err(|e| RouteError::state_query(format!("addresses of {}", resolved.name), &e))?;
    } else {
        info!("no interface resolved, only clearing offline interfaces");
    }

    let mut active = BTreeSet::new();
    if let (Some(resolved), Some(_)) = (&resolved, &lease) {
        active.insert(resolved.name.clone());
    }
    for nic in &policy.safe_nics {
        if active.contains(nic) {
            continue;
        }
        if active_lease(leases, nic, now)?.is_some() {
            active.insert(nic.clone());
        }
    }
    let cleanup_nics = cleanup_interfaces(&policy, &active);

    let live = table
        .list()
        .map_err(|e| RouteError::state_query("routing table", &e))?;
    let untagged = if resolved.is_some() {
        untagged_routes(table, &decoded, &policy.forced_routes, &live)?
    } else {
        BTreeMap::new()
    };

    Ok(HostState {
        policy,
        resolved,
        lease,
        decoded,
        decode_error,
        addresses,
        live,
        cleanup_nics,
        untagged,
    })
}

/// Look up desired destinations we have no tagged route for. A hit means an
/// add would fail with "File exists" on every pass.
fn untagged_routes(
    table: &dyn RoutingTable,
    decoded: &[RouteEntry],
    forced: &[RouteEntry],
    live: &[LiveRoute],
) -> Result<BTreeMap<Ipv4Net, String>> {
    let tagged: BTreeSet<Ipv4Net> = live.iter().map(|r| r.destination).collect();
    let mut untagged = BTreeMap::new();

    for route in desired_routes(decoded, forced) {
        let destination = route.destination;
        if !is_managed_destination(destination) || tagged.contains(&destination) {
            continue;
        }
        let found = table
            .foreign_route(destination)
            .map_err(|e| RouteError::state_query(format!("routes for {}", destination), &e))?;
        if let Some(existing) = found {
            debug!(%destination, existing = existing.as_str(), "destination held by untagged route");
            untagged.insert(destination, existing);
        }
    }

    Ok(untagged)
}

/// Run one full pass against the host.
pub fn reconcile(
    policy: OverridePolicy,
    leases: &dyn LeaseSource,
    network: &dyn NetworkState,
    table: &dyn RoutingTable,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome> {
    let state = gather_state(policy, leases, network, table, now)?;
    let plan = state.plan();
    let stats = apply_plan(table, &plan);

    info!(
        added = stats.added,
        replaced = stats.replaced,
        removed = stats.removed,
        unchanged = stats.unchanged,
        rejected = stats.rejected,
        shadowed = stats.shadowed,
        failed = stats.failed(),
        "reconciliation finished"
    );

    Ok(ReconcileOutcome { state, plan, stats })
}
