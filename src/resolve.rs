use tracing::{debug, info};

use crate::{InterfaceSource, OverridePolicy, ResolvedInterface};

/// Pick the interface whose lease drives this pass.
///
/// A `nic` pin in the override always wins over the default-route holder, so
/// an operator can settle hosts where the lease and the default route sit on
/// different interfaces. `None` is the disconnected state, not an error.
pub fn resolve_interface(
    policy: &OverridePolicy,
    default_route_iface: Option<&str>,
) -> Option<ResolvedInterface> {
    if let Some(nic) = policy.nic.as_deref() {
        if let Some(auto) = default_route_iface.filter(|auto| *auto != nic) {
            info!(pinned = nic, default_route = auto, "override pin replaces default-route interface");
        }
        return Some(ResolvedInterface {
            name: nic.to_string(),
            source: InterfaceSource::Pinned,
        });
    }

    match default_route_iface {
        Some(iface) if !iface.is_empty() => Some(ResolvedInterface {
            name: iface.to_string(),
            source: InterfaceSource::DefaultRoute,
        }),
        _ => {
            debug!("no default route and no pinned interface");
            None
        }
    }
}
