use ipnet::Ipv4Net;
use tracing::{info, warn};

use super::plan::{ReconcilePlan, RouteOp};
use crate::system::{OpOutcome, RoutingTable};
use crate::{ReconcileStats, RouteEntry, RouteError};

/// Apply a plan operation by operation.
///
/// A failed operation is logged and recorded; the remaining operations still run.
pub fn apply_plan(table: &dyn RoutingTable, plan: &ReconcilePlan) -> ReconcileStats {
    let mut stats = ReconcileStats {
        unchanged: plan.unchanged.len(),
        rejected: plan.rejected.len(),
        shadowed: plan.shadowed.len(),
        ..Default::default()
    };

    for op in &plan.ops {
        match op {
            RouteOp::Remove { old, reason } => match remove(table, old.destination) {
                Ok(OpOutcome::Applied) => {
                    info!(route = %old, ?reason, "removed route");
                    stats.removed += 1;
                }
                Ok(OpOutcome::NoOp) => {
                    info!(route = %old, "route already gone");
                    stats.removed += 1;
                }
                Err(e) => stats.failures.push(e),
            },
            RouteOp::Replace {
                old,
                route,
                interface,
            } => {
                if let Err(e) = remove(table, old.destination) {
                    stats.failures.push(e);
                    continue;
                }
                match add(table, route, interface) {
                    Ok(_) => {
                        info!(old = %old, route = %route, interface = interface.as_str(), "replaced route");
                        stats.replaced += 1;
                    }
                    Err(e) => stats.failures.push(e),
                }
            }
            RouteOp::Add { route, interface } => {
                match add(table, route, interface) {
                    Ok(OpOutcome::Applied) => {
                        info!(route = %route, interface = interface.as_str(), "added route");
                        stats.added += 1;
                    }
                    Ok(OpOutcome::NoOp) => {
                        // Installed by someone else since the table was read
                        warn!(
                            route = %route,
                            interface = interface.as_str(),
                            "destination already routed by another source, not adding"
                        );
                        stats.shadowed += 1;
                    }
                    Err(e) => stats.failures.push(e),
                }
            }
        }
    }

    stats
}

fn remove(table: &dyn RoutingTable, destination: Ipv4Net) -> Result<OpOutcome, RouteError> {
    table
        .remove(destination)
        .map_err(|e| operation_failed("remove", destination, &e))
}

fn add(table: &dyn RoutingTable, route: &RouteEntry, interface: &str) -> Result<OpOutcome, RouteError> {
    table
        .add(route, interface)
        .map_err(|e| operation_failed("add", route.destination, &e))
}

fn operation_failed(op: &'static str, destination: Ipv4Net, err: &anyhow::Error) -> RouteError {
    let err = RouteError::RouteOperationFailed {
        op,
        destination,
        reason: format!("{:#}", err),
    };
    warn!(%destination, "{}", err);
    err
}
